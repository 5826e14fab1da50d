//! # Partner Envelope
//!
//! Message envelope for third-party inventory and pricing integrations.
//! Structurally similar to [`crate::bus::Message`] but a separate type
//! on purpose: partner traffic is versioned and crosses a process
//! boundary, and must never be routed through the in-process bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::unique_id;

/// Envelope schema version spoken to partners
pub const ENVELOPE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerEnvelope {
    pub id: String,
    /// Schema version, negotiated out of band
    pub version: String,
    /// Partner-defined message type, e.g. "inventory_check"
    #[serde(rename = "type")]
    pub message_type: String,
    pub timestamp: DateTime<Utc>,
    /// Originating system identifier
    pub source: String,
    /// Receiving system; absent for broadcast feeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub payload: Value,
}

impl PartnerEnvelope {
    pub fn new(message_type: &str, source: &str, payload: Value) -> Self {
        Self {
            id: unique_id(),
            version: ENVELOPE_VERSION.to_string(),
            message_type: message_type.to_string(),
            timestamp: Utc::now(),
            source: source.to_string(),
            destination: None,
            payload,
        }
    }

    pub fn to(mut self, destination: &str) -> Self {
        self.destination = Some(destination.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_serializes_with_type_field() {
        let envelope = PartnerEnvelope::new(
            "pricing_request",
            "atelier",
            json!({ "material": "walnut", "board_feet": 27 }),
        )
        .to("lumber-partner");

        let value = serde_json::to_value(&envelope).unwrap_or_default();
        assert_eq!(value["type"], "pricing_request");
        assert_eq!(value["version"], ENVELOPE_VERSION);
        assert_eq!(value["destination"], "lumber-partner");
    }

    #[test]
    fn test_destination_omitted_for_broadcast_feeds() {
        let envelope = PartnerEnvelope::new("inventory_feed", "atelier", json!({}));
        let value = serde_json::to_value(&envelope).unwrap_or_default();
        assert!(value.get("destination").is_none());
    }
}
