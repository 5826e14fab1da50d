//! # Design Model
//!
//! Core data types for the evolving furniture design: the design record
//! itself, categorized constraints, decisions, the change trail, advisory
//! locks, and the per-turn proposal/response types exchanged with the
//! specialist agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outer dimensions of the piece, in inches
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

impl Dimensions {
    pub fn new(width: f64, height: f64, depth: f64) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Smallest footprint edge, used by the stability check
    pub fn min_footprint(&self) -> f64 {
        self.width.min(self.depth)
    }
}

/// Validation state of the design
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    #[default]
    NotValidated,
    Valid,
    Invalid,
}

/// The progressively filled design record
///
/// Mutated by shallow merge of a [`DesignPatch`] only; never reconstructed
/// except through an explicit reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Design {
    pub furniture_type: Option<String>,
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub joinery: Vec<String>,
    #[serde(default)]
    pub hardware: Vec<String>,
    pub estimated_cost: Option<f64>,
    pub style: Option<String>,
    #[serde(default)]
    pub validation_status: ValidationStatus,
    pub updated_at: DateTime<Utc>,
}

impl Default for Design {
    fn default() -> Self {
        Self {
            furniture_type: None,
            dimensions: None,
            materials: Vec::new(),
            joinery: Vec::new(),
            hardware: Vec::new(),
            estimated_cost: None,
            style: None,
            validation_status: ValidationStatus::NotValidated,
            updated_at: Utc::now(),
        }
    }
}

impl Design {
    /// Shallow merge: every populated patch field replaces its counterpart,
    /// unset fields are left untouched.
    pub fn merge(&mut self, patch: &DesignPatch) {
        if let Some(furniture_type) = &patch.furniture_type {
            self.furniture_type = Some(furniture_type.clone());
        }
        if let Some(dimensions) = patch.dimensions {
            self.dimensions = Some(dimensions);
        }
        if let Some(materials) = &patch.materials {
            self.materials = materials.clone();
        }
        if let Some(joinery) = &patch.joinery {
            self.joinery = joinery.clone();
        }
        if let Some(hardware) = &patch.hardware {
            self.hardware = hardware.clone();
        }
        if let Some(cost) = patch.estimated_cost {
            self.estimated_cost = Some(cost);
        }
        if let Some(style) = &patch.style {
            self.style = Some(style.clone());
        }
        if let Some(status) = patch.validation_status {
            self.validation_status = status;
        }
    }

    /// Count of populated core fields (out of 5): furniture_type,
    /// dimensions, materials, joinery, and a `valid` validation status.
    pub fn populated_core_fields(&self) -> u8 {
        let mut count = 0u8;
        if self.furniture_type.is_some() {
            count += 1;
        }
        if self.dimensions.is_some() {
            count += 1;
        }
        if !self.materials.is_empty() {
            count += 1;
        }
        if !self.joinery.is_empty() {
            count += 1;
        }
        if self.validation_status == ValidationStatus::Valid {
            count += 1;
        }
        count
    }

    /// Completeness predicate gating validation: type, dimensions,
    /// materials, and joinery must all be populated.
    pub fn ready_for_validation(&self) -> bool {
        self.furniture_type.is_some()
            && self.dimensions.is_some()
            && !self.materials.is_empty()
            && !self.joinery.is_empty()
    }
}

/// A partial design update; unset fields are not merged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesignPatch {
    pub furniture_type: Option<String>,
    pub dimensions: Option<Dimensions>,
    pub materials: Option<Vec<String>>,
    pub joinery: Option<Vec<String>>,
    pub hardware: Option<Vec<String>>,
    pub estimated_cost: Option<f64>,
    pub style: Option<String>,
    pub validation_status: Option<ValidationStatus>,
}

impl DesignPatch {
    pub fn is_empty(&self) -> bool {
        self.furniture_type.is_none()
            && self.dimensions.is_none()
            && self.materials.is_none()
            && self.joinery.is_none()
            && self.hardware.is_none()
            && self.estimated_cost.is_none()
            && self.style.is_none()
            && self.validation_status.is_none()
    }
}

/// Categorized design guardrails
///
/// Each category is an open JSON object merged recursively: a partial
/// update never erases unrelated existing keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub dimensional: Map<String, Value>,
    #[serde(default)]
    pub material: Map<String, Value>,
    #[serde(default)]
    pub structural: Map<String, Value>,
    #[serde(default)]
    pub aesthetic: Map<String, Value>,
    #[serde(default)]
    pub budget: Map<String, Value>,
}

impl Constraints {
    /// Additive recursive merge, category by category
    pub fn merge(&mut self, patch: &Constraints) {
        merge_objects(&mut self.dimensional, &patch.dimensional);
        merge_objects(&mut self.material, &patch.material);
        merge_objects(&mut self.structural, &patch.structural);
        merge_objects(&mut self.aesthetic, &patch.aesthetic);
        merge_objects(&mut self.budget, &patch.budget);
    }

    pub fn is_empty(&self) -> bool {
        self.dimensional.is_empty()
            && self.material.is_empty()
            && self.structural.is_empty()
            && self.aesthetic.is_empty()
            && self.budget.is_empty()
    }

    /// `budget.max_total_cost`, if a numeric ceiling has been set
    pub fn max_total_cost(&self) -> Option<f64> {
        self.budget.get("max_total_cost").and_then(Value::as_f64)
    }
}

/// Recursive JSON object merge: matching nested objects merge key-wise,
/// everything else is replaced.
fn merge_objects(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_objects(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// A recorded design decision, upserted by `agent` + `decision_type`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub agent: String,
    pub decision_type: String,
    pub value: Value,
    pub reasoning: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// One entry in the append-only change trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub agent: String,
    pub timestamp: DateTime<Utc>,
    pub previous_value: Value,
    pub new_value: Value,
    pub property_path: String,
    pub reason: Option<String>,
}

/// Advisory, time-bounded exclusive-write claim on one property
///
/// Purely informational: the write path never enforces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyLock {
    pub id: String,
    pub agent: String,
    pub property: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PropertyLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of a validation pass, stored per validating agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub agent: String,
    pub valid: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    pub score: f64,
    pub checked_at: DateTime<Utc>,
}

/// A specialist agent's partial-design proposal for one turn
///
/// Tagged per agent domain so coordinator matching is exhaustive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Proposal {
    Dimensions {
        dimensions: Dimensions,
        rationale: String,
    },
    Materials {
        materials: Vec<String>,
        estimated_cost: Option<f64>,
        #[serde(default)]
        alternatives: Vec<String>,
    },
    Joinery {
        methods: Vec<String>,
        rationale: String,
    },
    Validation {
        result: ValidationResult,
    },
}

/// Transient per-turn output of one specialist agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent: String,
    pub success: bool,
    pub proposal: Option<Proposal>,
    #[serde(default)]
    pub validation_issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl AgentResponse {
    pub fn new(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            success: true,
            proposal: None,
            validation_issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Substitute response for an agent that failed catastrophically
    pub fn fallback(agent: &str, issue: &str) -> Self {
        Self {
            agent: agent.to_string(),
            success: false,
            proposal: None,
            validation_issues: vec![issue.to_string()],
            suggestions: Vec::new(),
        }
    }

    pub fn with_proposal(mut self, proposal: Proposal) -> Self {
        self.proposal = Some(proposal);
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.suggestions.push(suggestion.to_string());
        self
    }
}

/// Categories of cross-agent conflicts the cohesion pass can detect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    MaterialJoineryIncompatibility,
    DimensionStability,
    BudgetExceeded,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::MaterialJoineryIncompatibility => "material_joinery_incompatibility",
            ConflictKind::DimensionStability => "dimension_stability",
            ConflictKind::BudgetExceeded => "budget_exceeded",
        }
    }
}

/// Transient record of one detected conflict and its resolution; applied
/// immediately as a [`Decision`] and never persisted past the turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub kind: ConflictKind,
    pub description: String,
    pub resolution: String,
    pub recommended: Value,
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shallow_merge_leaves_unset_fields() {
        let mut design = Design::default();
        design.materials = vec!["oak".to_string()];

        let patch = DesignPatch {
            furniture_type: Some("bookshelf".to_string()),
            ..Default::default()
        };
        design.merge(&patch);

        assert_eq!(design.furniture_type.as_deref(), Some("bookshelf"));
        assert_eq!(design.materials, vec!["oak".to_string()]);
    }

    #[test]
    fn test_constraint_merge_is_additive() {
        let mut constraints = Constraints::default();
        constraints
            .dimensional
            .insert("max_height".to_string(), json!(84));

        let mut patch = Constraints::default();
        patch.budget.insert("max_total_cost".to_string(), json!(300));
        constraints.merge(&patch);

        assert_eq!(constraints.dimensional.get("max_height"), Some(&json!(84)));
        assert_eq!(constraints.max_total_cost(), Some(300.0));
    }

    #[test]
    fn test_constraint_merge_recurses_into_nested_objects() {
        let mut constraints = Constraints::default();
        constraints.structural.insert(
            "shelf".to_string(),
            json!({"max_span": 32, "material": "oak"}),
        );

        let mut patch = Constraints::default();
        patch
            .structural
            .insert("shelf".to_string(), json!({"max_span": 28}));
        constraints.merge(&patch);

        let shelf = constraints.structural.get("shelf").unwrap();
        assert_eq!(shelf["max_span"], json!(28));
        assert_eq!(shelf["material"], json!("oak"));
    }

    #[test]
    fn test_core_field_count() {
        let mut design = Design::default();
        assert_eq!(design.populated_core_fields(), 0);

        design.furniture_type = Some("bookshelf".to_string());
        design.dimensions = Some(Dimensions::new(36.0, 72.0, 12.0));
        design.materials = vec!["pine".to_string()];
        assert_eq!(design.populated_core_fields(), 3);
        assert!(!design.ready_for_validation());

        design.joinery = vec!["dado".to_string()];
        assert!(design.ready_for_validation());
        design.validation_status = ValidationStatus::Valid;
        assert_eq!(design.populated_core_fields(), 5);
    }

    #[test]
    fn test_proposal_serializes_with_kind_tag() {
        let proposal = Proposal::Joinery {
            methods: vec!["dado".to_string()],
            rationale: "shelf carcass".to_string(),
        };
        let json = serde_json::to_value(&proposal).unwrap();
        assert_eq!(json["kind"], json!("joinery"));
        assert_eq!(json["methods"][0], json!("dado"));
    }
}
