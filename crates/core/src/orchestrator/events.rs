//! # Turn Events
//!
//! Progress events emitted while a turn moves through its stages, for
//! presentation layers that stream status to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::unique_id;

/// Kind of turn event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnEventKind {
    /// Turn started processing user input
    TurnStarted,
    /// Intent classified (data carries the category)
    IntentClassified,
    /// A specialist agent started working
    AgentStarted,
    /// A specialist agent returned a response
    AgentCompleted,
    /// A specialist agent failed; a fallback response was substituted
    AgentFailed,
    /// Harmonization pass finished (data carries conflict count)
    Harmonized,
    /// Validation agent ran against the completed design
    ValidationRun,
    /// Turn finished and a response was synthesized
    TurnCompleted,
    /// Session state was reset to the empty template
    SessionReset,
}

/// An event in the turn pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnEvent {
    /// Unique event ID
    pub id: String,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Kind of event
    pub kind: TurnEventKind,
    /// Agent (or stage owner) that produced this event
    pub agent: String,
    /// Associated data (JSON)
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl TurnEvent {
    /// Create a new event
    pub fn new(kind: TurnEventKind, agent: &str) -> Self {
        Self {
            id: unique_id(),
            timestamp: Utc::now(),
            kind,
            agent: agent.to_string(),
            data: None,
        }
    }

    /// Add data to the event
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = TurnEvent::new(TurnEventKind::AgentStarted, "dimension")
            .with_data(serde_json::json!({ "input": "36 inches wide" }));

        assert_eq!(event.agent, "dimension");
        assert!(event.data.is_some());
        assert!(!event.id.is_empty());
    }
}
