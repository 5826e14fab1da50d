//! # Specialist Agents
//!
//! Independent reasoning units, one per design domain, behind a uniform
//! capability contract: `can_handle` for routing probes and `process` for
//! producing one per-turn proposal. The orchestrator substitutes a
//! fallback response for any specialist that fails, so a single bad agent
//! never aborts a turn.

pub mod dimension;
pub mod joinery;
pub mod material;
pub mod validation;

pub use dimension::DimensionAgent;
pub use joinery::JoineryAgent;
pub use material::MaterialAgent;
pub use validation::ValidationAgent;

use crate::bus::{BusEndpoint, Message};
use crate::model::AgentResponse;
use crate::state::{DesignSnapshot, SharedDesignState};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Uniform capability contract for one specialist
#[async_trait]
pub trait SpecialistAgent: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap routing probe: could this agent contribute to `input`?
    fn can_handle(&self, input: &str, snapshot: &DesignSnapshot) -> bool;

    /// Produce this turn's proposal against an immutable snapshot
    async fn process(&self, input: &str, snapshot: &DesignSnapshot) -> anyhow::Result<AgentResponse>;
}

/// The fixed specialist roster for a session, chosen at startup and
/// never changed at runtime
pub fn default_specialists() -> Vec<Arc<dyn SpecialistAgent>> {
    vec![
        Arc::new(DimensionAgent),
        Arc::new(MaterialAgent),
        Arc::new(JoineryAgent),
        Arc::new(ValidationAgent),
    ]
}

/// Adapter exposing a specialist as a direct request endpoint on the bus
pub struct AgentEndpoint {
    agent: Arc<dyn SpecialistAgent>,
    state: SharedDesignState,
}

impl AgentEndpoint {
    pub fn new(agent: Arc<dyn SpecialistAgent>, state: SharedDesignState) -> Self {
        Self { agent, state }
    }
}

#[async_trait]
impl BusEndpoint for AgentEndpoint {
    fn name(&self) -> &str {
        self.agent.name()
    }

    async fn on_request(&self, message: &Message) -> anyhow::Result<Value> {
        let input = message
            .payload
            .get("input")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let snapshot = self.state.snapshot();
        let response = self.agent.process(&input, &snapshot).await?;
        Ok(serde_json::to_value(response)?)
    }
}
