//! # Joinery Agent
//!
//! Maps joinery vocabulary in the input to the fixed method list, and
//! falls back to the customary method for the furniture type when the
//! user has not expressed a preference.

use crate::agents::SpecialistAgent;
use crate::model::{AgentResponse, Proposal};
use crate::state::DesignSnapshot;
use async_trait::async_trait;

/// (canonical method, phrases that mean it)
const VOCABULARY: &[(&str, &[&str])] = &[
    ("dovetail", &["dovetail"]),
    ("mortise-tenon", &["mortise", "tenon"]),
    ("pocket-hole", &["pocket hole", "pocket-hole", "pocket screw"]),
    ("dado", &["dado"]),
    ("biscuit", &["biscuit"]),
    ("dowel", &["dowel"]),
    ("box-joint", &["box joint", "box-joint", "finger joint"]),
];

/// Customary joinery per furniture type
const DEFAULTS: &[(&str, &str)] = &[
    ("bookshelf", "dado"),
    ("cabinet", "dado"),
    ("dresser", "dovetail"),
    ("nightstand", "dovetail"),
    ("table", "mortise-tenon"),
    ("desk", "mortise-tenon"),
    ("bench", "mortise-tenon"),
    ("chair", "mortise-tenon"),
];

const HANDLE_KEYWORDS: &[&str] = &["join", "joint", "joinery", "connect", "assemble", "fasten"];

pub struct JoineryAgent;

impl JoineryAgent {
    fn mentioned(input: &str) -> Vec<String> {
        let lowered = input.to_ascii_lowercase();
        VOCABULARY
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|phrase| lowered.contains(phrase)))
            .map(|(method, _)| method.to_string())
            .collect()
    }

    fn default_for(furniture_type: &str) -> Option<&'static str> {
        DEFAULTS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(furniture_type.trim()))
            .map(|(_, method)| *method)
    }
}

#[async_trait]
impl SpecialistAgent for JoineryAgent {
    fn name(&self) -> &'static str {
        "joinery"
    }

    fn can_handle(&self, input: &str, _snapshot: &DesignSnapshot) -> bool {
        let lowered = input.to_ascii_lowercase();
        !Self::mentioned(input).is_empty() || HANDLE_KEYWORDS.iter().any(|k| lowered.contains(k))
    }

    async fn process(
        &self,
        input: &str,
        snapshot: &DesignSnapshot,
    ) -> anyhow::Result<AgentResponse> {
        let mut response = AgentResponse::new(self.name());
        let mentioned = Self::mentioned(input);

        if !mentioned.is_empty() {
            response.proposal = Some(Proposal::Joinery {
                methods: mentioned,
                rationale: "requested by the user".to_string(),
            });
            return Ok(response);
        }

        match snapshot
            .design
            .furniture_type
            .as_deref()
            .and_then(Self::default_for)
        {
            Some(method) if snapshot.design.joinery.is_empty() => {
                let furniture_type = snapshot.design.furniture_type.clone().unwrap_or_default();
                response.proposal = Some(Proposal::Joinery {
                    methods: vec![method.to_string()],
                    rationale: format!("customary for a {}", furniture_type),
                });
            }
            _ => {
                response.suggestions.push(
                    "How should the parts join - dovetail, mortise and tenon, dado, or pocket screws?"
                        .to_string(),
                );
            }
        }
        Ok(response)
    }
}
