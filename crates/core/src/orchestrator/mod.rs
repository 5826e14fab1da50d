//! # Orchestrator
//!
//! Top-level control loop for one design session. Each turn moves
//! through fixed stages: intent classification, agent routing and
//! fan-out, harmonization, optional validation, response synthesis.
//! Every turn yields a text response and suggestions, whatever fails
//! along the way.

pub mod events;
pub mod intent;
pub mod synthesis;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::agents::{default_specialists, AgentEndpoint, SpecialistAgent};
use crate::bus::{MessageBus, DEFAULT_REQUEST_TIMEOUT};
use crate::harmony::CohesionCoordinator;
use crate::model::{AgentResponse, DesignPatch, Proposal, ValidationResult, ValidationStatus};
use crate::reasoning::{
    with_backoff, ReasoningCapability, ReasoningRequest, ReasoningSettings, DEFAULT_MAX_ATTEMPTS,
};
use crate::state::{SharedDesignState, DEFAULT_LOCK_TTL_SECS};

use events::{TurnEvent, TurnEventKind};
use intent::Intent;

/// Per-session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Timeout for bus request/response round-trips
    pub request_timeout_ms: u64,
    /// Ring-buffer capacity of the change trail
    pub history_capacity: usize,
    /// Advisory lock time-to-live
    pub lock_ttl_secs: i64,
    /// Cap on the suggestion list returned each turn
    pub max_suggestions: usize,
    /// Projected board feet above which the material budget is scaled
    pub board_feet_budget_threshold: f64,
    /// Optional reasoning endpoint for refining unclear intents
    #[serde(default)]
    pub reasoning: Option<ReasoningSettings>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            history_capacity: crate::state::DEFAULT_CAPACITY,
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
            max_suggestions: synthesis::MAX_SUGGESTIONS,
            board_feet_budget_threshold: crate::harmony::rules::BOARD_FEET_BUDGET_THRESHOLD,
            reasoning: None,
        }
    }
}

/// What one turn returns to the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub success: bool,
    pub response: String,
    pub suggestions: Vec<String>,
    pub validation_results: HashMap<String, ValidationResult>,
    pub design_progress: u32,
}

const ORCHESTRATOR_AGENT: &str = "orchestrator";
const VALIDATION_AGENT: &str = "validation";
const RECENT_CHANGES_SHOWN: usize = 3;

/// Output shape the reasoning refinement is asked for
#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct IntentLabel {
    /// One of the routing category names
    category: String,
}

/// One session's control loop over shared state, the bus, and the
/// specialist roster. Explicitly constructed and injected; no globals.
pub struct Orchestrator {
    config: SessionConfig,
    state: SharedDesignState,
    bus: MessageBus,
    agents: Vec<Arc<dyn SpecialistAgent>>,
    coordinator: CohesionCoordinator,
    reasoner: Option<Arc<dyn ReasoningCapability>>,
    events: Vec<TurnEvent>,
    event_tx: Option<mpsc::Sender<TurnEvent>>,
}

impl Orchestrator {
    /// Build a session with the default specialist roster, registering
    /// each specialist as a request endpoint on the bus.
    pub fn new(config: SessionConfig) -> Self {
        let state = SharedDesignState::new(config.history_capacity, config.lock_ttl_secs);
        let bus = MessageBus::new(std::time::Duration::from_millis(config.request_timeout_ms));
        let agents = default_specialists();
        for agent in &agents {
            bus.register_agent(Arc::new(AgentEndpoint::new(agent.clone(), state.clone())));
        }
        let coordinator = CohesionCoordinator::new(config.board_feet_budget_threshold);
        let reasoner = config
            .reasoning
            .clone()
            .map(|settings| {
                Arc::new(crate::reasoning::HttpReasoner::new(settings))
                    as Arc<dyn ReasoningCapability>
            });
        Self {
            config,
            state,
            bus,
            agents,
            coordinator,
            reasoner,
            events: Vec::new(),
            event_tx: None,
        }
    }

    /// Set event channel for streaming turn progress
    pub fn with_event_channel(mut self, tx: mpsc::Sender<TurnEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Swap in a reasoning capability (scripted in tests)
    pub fn with_reasoner(mut self, reasoner: Arc<dyn ReasoningCapability>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    pub fn state(&self) -> &SharedDesignState {
        &self.state
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn events(&self) -> &[TurnEvent] {
        &self.events
    }

    /// Process one turn of user input. Never fails: any error crossing
    /// the turn boundary becomes an apologetic outcome with recovery
    /// suggestions.
    #[tracing::instrument(skip(self, input))]
    pub async fn process_input(&mut self, input: &str) -> TurnOutcome {
        match self.run_turn(input).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(%error, "turn failed at the session boundary");
                let snapshot = self.state.snapshot();
                TurnOutcome {
                    success: false,
                    response: "Something went wrong while updating the design. \
                               Your work so far is intact; let's try that again."
                        .to_string(),
                    suggestions: vec![
                        "Try rephrasing your last request.".to_string(),
                        "Ask for the current status to see where the design stands.".to_string(),
                    ],
                    validation_results: snapshot.validation_results.clone(),
                    design_progress: synthesis::design_progress(&snapshot),
                }
            }
        }
    }

    /// Reset the session to the empty design template
    pub async fn reset(&mut self) {
        self.state.reset();
        self.emit(TurnEvent::new(TurnEventKind::SessionReset, ORCHESTRATOR_AGENT))
            .await;
    }

    async fn run_turn(&mut self, input: &str) -> Result<TurnOutcome> {
        self.emit(TurnEvent::new(TurnEventKind::TurnStarted, ORCHESTRATOR_AGENT))
            .await;

        let intent = self.classify(input).await;
        self.emit(
            TurnEvent::new(TurnEventKind::IntentClassified, ORCHESTRATOR_AGENT)
                .with_data(serde_json::json!({ "intent": intent.as_str() })),
        )
        .await;

        // Naming a piece (or a style) is the orchestrator's own write;
        // no specialist owns the furniture_type field.
        if intent == Intent::CreateFurniture {
            let patch = DesignPatch {
                furniture_type: intent::detect_furniture_type(input).map(str::to_string),
                style: intent::detect_style(input).map(str::to_string),
                ..Default::default()
            };
            if !patch.is_empty() {
                self.state
                    .update_design(ORCHESTRATOR_AGENT, &patch, Some("user named the piece"));
            }
        }

        let routed = self.route(intent, input);
        let mut responses = self.fan_out(&routed, input).await;

        let mut report = self.coordinator.harmonize(&responses, &self.state);
        self.emit(
            TurnEvent::new(TurnEventKind::Harmonized, crate::harmony::COORDINATOR_AGENT).with_data(
                serde_json::json!({
                    "conflicts": report.conflicts.len(),
                    "harmonized": report.harmonized,
                }),
            ),
        )
        .await;

        // Validation runs once per turn, only against a complete-enough
        // design, and only if routing did not already invoke it.
        let already_validated = responses.iter().any(|r| r.agent == VALIDATION_AGENT);
        if !already_validated && report.final_state.design.ready_for_validation() {
            if let Some(response) = self.run_validation(input).await {
                responses.push(response);
                report.final_state = self.state.snapshot();
            }
        }

        // Status turns recall the tail of the change trail.
        let recent_changes = if intent == Intent::StatusQuery {
            self.state.recent_changes(RECENT_CHANGES_SHOWN)
        } else {
            Vec::new()
        };
        let response = synthesis::synthesize(intent, &responses, &report, &recent_changes);
        let suggestions = synthesis::build_suggestions(
            &responses,
            &report.final_state,
            self.config.max_suggestions,
        );
        let outcome = TurnOutcome {
            success: true,
            response,
            suggestions,
            validation_results: report.final_state.validation_results.clone(),
            design_progress: synthesis::design_progress(&report.final_state),
        };
        self.emit(
            TurnEvent::new(TurnEventKind::TurnCompleted, ORCHESTRATOR_AGENT)
                .with_data(serde_json::json!({ "progress": outcome.design_progress })),
        )
        .await;
        Ok(outcome)
    }

    /// Keyword classification, refined by the reasoning capability only
    /// when the keyword path comes up unclear. Reasoning failure is
    /// non-fatal; the unclear result stands.
    async fn classify(&self, input: &str) -> Intent {
        let keyword_intent = intent::classify(input);
        if keyword_intent != Intent::Unclear {
            return keyword_intent;
        }
        let Some(reasoner) = self.reasoner.as_deref() else {
            return keyword_intent;
        };
        let request = ReasoningRequest::new(
            "You route furniture-design requests. Pick exactly one category: \
             create_furniture, adjust_dimensions, select_materials, select_joinery, \
             request_validation, status_query, or unclear.",
            input,
        )
        .with_schema::<IntentLabel>();
        match with_backoff(reasoner, &request, DEFAULT_MAX_ATTEMPTS).await {
            Ok(text) => {
                // Schema-shaped JSON preferred; a bare label is accepted.
                let label = serde_json::from_str::<IntentLabel>(&text)
                    .map(|parsed| parsed.category)
                    .unwrap_or(text);
                Intent::from_label(&label).unwrap_or(Intent::Unclear)
            }
            Err(error) => {
                tracing::debug!(%error, "reasoning refinement failed; keeping unclear intent");
                Intent::Unclear
            }
        }
    }

    /// Static routing map; unmapped intents poll every agent's
    /// `can_handle` against the current snapshot.
    fn route(&self, intent: Intent, input: &str) -> Vec<Arc<dyn SpecialistAgent>> {
        match intent::routed_agents(intent) {
            Some(names) => self
                .agents
                .iter()
                .filter(|agent| names.contains(&agent.name()))
                .cloned()
                .collect(),
            None => {
                let snapshot = self.state.snapshot();
                self.agents
                    .iter()
                    .filter(|agent| agent.can_handle(input, &snapshot))
                    .cloned()
                    .collect()
            }
        }
    }

    /// Concurrent fan-out over the routed agents. All agents see the
    /// same pre-turn snapshot; results merge into state only after every
    /// task settles. A failing or panicking agent becomes a fallback
    /// response, never an aborted turn.
    async fn fan_out(
        &mut self,
        routed: &[Arc<dyn SpecialistAgent>],
        input: &str,
    ) -> Vec<AgentResponse> {
        if routed.is_empty() {
            return Vec::new();
        }
        let snapshot = self.state.snapshot();
        let mut join_set = JoinSet::new();

        for agent in routed {
            let agent = agent.clone();
            let input = input.to_string();
            let snapshot = snapshot.clone();
            self.emit(TurnEvent::new(TurnEventKind::AgentStarted, agent.name()))
                .await;
            join_set.spawn(async move {
                let name = agent.name();
                let result = agent.process(&input, &snapshot).await;
                (name, result)
            });
        }

        let mut responses = Vec::with_capacity(routed.len());
        while let Some(joined) = join_set.join_next().await {
            let response = match joined {
                Ok((name, Ok(response))) => {
                    self.emit(TurnEvent::new(TurnEventKind::AgentCompleted, name))
                        .await;
                    response
                }
                Ok((name, Err(error))) => {
                    tracing::warn!(agent = name, %error, "agent failed; substituting fallback");
                    self.emit(TurnEvent::new(TurnEventKind::AgentFailed, name))
                        .await;
                    AgentResponse::fallback(name, &format!("{} agent could not process the request", name))
                }
                Err(join_error) => {
                    tracing::warn!(%join_error, "agent task aborted; substituting fallback");
                    self.emit(TurnEvent::new(TurnEventKind::AgentFailed, ORCHESTRATOR_AGENT))
                        .await;
                    AgentResponse::fallback(ORCHESTRATOR_AGENT, "an agent task aborted mid-turn")
                }
            };
            responses.push(response);
        }
        responses
    }

    /// Invoke the validation specialist and commit its verdict under its
    /// own key.
    async fn run_validation(&mut self, input: &str) -> Option<AgentResponse> {
        let agent = self
            .agents
            .iter()
            .find(|agent| agent.name() == VALIDATION_AGENT)?
            .clone();
        let snapshot = self.state.snapshot();
        let response = match agent.process(input, &snapshot).await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(%error, "validation agent failed; verdict skipped this turn");
                return None;
            }
        };
        if let Some(Proposal::Validation { result }) = &response.proposal {
            let status = if result.valid {
                ValidationStatus::Valid
            } else {
                ValidationStatus::Invalid
            };
            self.state
                .set_validation_result(VALIDATION_AGENT, result.clone());
            let patch = DesignPatch {
                validation_status: Some(status),
                ..Default::default()
            };
            self.state
                .update_design(VALIDATION_AGENT, &patch, Some("validation verdict"));
        }
        self.emit(TurnEvent::new(TurnEventKind::ValidationRun, VALIDATION_AGENT))
            .await;
        Some(response)
    }

    async fn emit(&mut self, event: TurnEvent) {
        self.events.push(event.clone());
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Dimensions;
    use crate::reasoning::{ReasoningError, ScriptedReasoner};

    #[tokio::test]
    async fn test_bookshelf_request_acknowledged_with_suggestions() {
        let mut orchestrator = Orchestrator::new(SessionConfig::default());
        let outcome = orchestrator.process_input("I want a bookshelf").await;

        assert!(outcome.success);
        assert!(outcome.response.contains("bookshelf"));
        assert!(!outcome.suggestions.is_empty());
        assert!(outcome.suggestions.len() <= 3);
    }

    #[tokio::test]
    async fn test_progress_reaches_sixty_without_joinery() {
        let mut orchestrator = Orchestrator::new(SessionConfig::default());
        let patch = DesignPatch {
            furniture_type: Some("bookshelf".to_string()),
            dimensions: Some(Dimensions::new(36.0, 72.0, 12.0)),
            materials: Some(vec!["oak".to_string()]),
            ..Default::default()
        };
        orchestrator.state().update_design("test", &patch, None);

        let outcome = orchestrator.process_input("what's the status?").await;
        assert_eq!(outcome.design_progress, 60);
    }

    #[tokio::test]
    async fn test_full_design_triggers_validation() {
        let mut orchestrator = Orchestrator::new(SessionConfig::default());
        orchestrator.process_input("I want a bookshelf").await;
        orchestrator
            .process_input("make it 36 x 72 x 12 inches")
            .await;
        orchestrator.process_input("use oak").await;
        let snapshot = orchestrator.state().snapshot();

        assert!(snapshot.design.ready_for_validation());
        assert!(snapshot.validation_results.contains_key("validation"));
        assert!(orchestrator
            .events()
            .iter()
            .any(|e| e.kind == TurnEventKind::ValidationRun));
    }

    #[tokio::test]
    async fn test_validation_request_on_empty_session_stores_no_verdict() {
        let mut orchestrator = Orchestrator::new(SessionConfig::default());
        let outcome = orchestrator.process_input("is it ready to build?").await;

        assert!(outcome.success);
        assert!(outcome.validation_results.is_empty());
        let snapshot = orchestrator.state().snapshot();
        assert!(snapshot.validation_results.is_empty());
        assert_eq!(
            snapshot.design.validation_status,
            crate::model::ValidationStatus::NotValidated
        );
        // the gap list still reaches the user
        assert!(outcome.response.contains("no furniture type"));
        assert!(!outcome.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_unclear_intent_still_yields_guidance() {
        let mut orchestrator = Orchestrator::new(SessionConfig::default());
        let outcome = orchestrator.process_input("hello there").await;

        assert!(outcome.success);
        assert!(!outcome.response.is_empty());
        assert!(!outcome.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_reasoning_refines_unclear_intent() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok(
            "select_materials".to_string()
        )]));
        let mut orchestrator =
            Orchestrator::new(SessionConfig::default()).with_reasoner(reasoner);

        // "something warm" carries no routing keywords
        let outcome = orchestrator.process_input("something warm please").await;
        assert!(outcome.success);
        let classified = orchestrator.events().iter().any(|e| {
            e.kind == TurnEventKind::IntentClassified
                && e.data == Some(serde_json::json!({ "intent": "select_materials" }))
        });
        assert!(classified);
    }

    #[tokio::test]
    async fn test_reasoning_accepts_schema_shaped_label() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok(
            r#"{ "category": "select_joinery" }"#.to_string(),
        )]));
        let mut orchestrator =
            Orchestrator::new(SessionConfig::default()).with_reasoner(reasoner);

        orchestrator.process_input("whatever suits it best").await;
        let classified = orchestrator.events().iter().any(|e| {
            e.kind == TurnEventKind::IntentClassified
                && e.data == Some(serde_json::json!({ "intent": "select_joinery" }))
        });
        assert!(classified);
    }

    #[tokio::test]
    async fn test_reasoning_failure_degrades_to_unclear() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Err(
            ReasoningError::Malformed("no".to_string()),
        )]));
        let mut orchestrator =
            Orchestrator::new(SessionConfig::default()).with_reasoner(reasoner);

        let outcome = orchestrator.process_input("mmm").await;
        assert!(outcome.success);
        assert!(!outcome.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_reset_event_emitted() {
        let mut orchestrator = Orchestrator::new(SessionConfig::default());
        orchestrator.process_input("I want a bench").await;
        orchestrator.reset().await;

        let snapshot = orchestrator.state().snapshot();
        assert!(snapshot.design.furniture_type.is_none());
        assert!(orchestrator
            .events()
            .iter()
            .any(|e| e.kind == TurnEventKind::SessionReset));
    }
}
