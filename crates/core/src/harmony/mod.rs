//! # Cohesion Coordinator
//!
//! Cross-cutting pass over one turn's agent proposals: merges the settled
//! proposals into shared state, detects semantic conflicts between them,
//! records each resolution as a decision, propagates derived constraints,
//! and scores the design's stylistic coherence.
//!
//! All conflict checks run independently against the same snapshot; a
//! resolution made here is never re-checked in the same turn, so a
//! second-order conflict introduced by a resolution goes undetected until
//! the next turn (observed single-pass behavior, kept as-is).

pub mod rules;

use crate::model::{
    AgentResponse, ConflictKind, ConflictResolution, Constraints, DesignPatch, Proposal,
    ValidationStatus,
};
use crate::state::{DesignSnapshot, SharedDesignState};
use serde_json::{json, Value};

/// Agent name the coordinator writes state under
pub const COORDINATOR_AGENT: &str = "cohesion";

/// Outcome of one harmonization pass
#[derive(Debug, Clone)]
pub struct HarmonyReport {
    /// True iff zero conflicts **and** zero coherence issues
    pub harmonized: bool,
    pub conflicts: Vec<ConflictResolution>,
    /// Stylistic annotations; these never block harmonization
    pub coherence_issues: Vec<String>,
    pub final_state: DesignSnapshot,
}

#[derive(Debug, Clone)]
pub struct CohesionCoordinator {
    board_feet_budget_threshold: f64,
}

impl Default for CohesionCoordinator {
    fn default() -> Self {
        Self {
            board_feet_budget_threshold: rules::BOARD_FEET_BUDGET_THRESHOLD,
        }
    }
}

impl CohesionCoordinator {
    pub fn new(board_feet_budget_threshold: f64) -> Self {
        Self {
            board_feet_budget_threshold,
        }
    }

    /// Merge this turn's settled responses, then detect and resolve
    /// conflicts against the resulting snapshot.
    pub fn harmonize(
        &self,
        responses: &[AgentResponse],
        state: &SharedDesignState,
    ) -> HarmonyReport {
        self.merge_responses(responses, state);

        // One input snapshot for every check; no intra-call chaining.
        let snapshot = state.snapshot();
        let mut conflicts = Vec::new();
        conflicts.extend(check_material_joinery(&snapshot));
        conflicts.extend(check_stability(&snapshot));
        conflicts.extend(check_budget(&snapshot));

        for conflict in &conflicts {
            record_resolution(conflict, &snapshot, state);
        }
        apply_joinery_resolutions(&conflicts, state);
        self.propagate_constraints(&snapshot, state);

        let coherence_issues = validate_coherence(&snapshot);
        HarmonyReport {
            harmonized: conflicts.is_empty() && coherence_issues.is_empty(),
            conflicts,
            coherence_issues,
            final_state: state.snapshot(),
        }
    }

    /// Commit each successful proposal; failed responses contribute
    /// nothing. Advisory locks held by other agents are respected here,
    /// the only place expected to consult them.
    fn merge_responses(&self, responses: &[AgentResponse], state: &SharedDesignState) {
        for response in responses {
            let Some(proposal) = response.proposal.as_ref().filter(|_| response.success) else {
                continue;
            };
            let reason = format!("proposal from {}", response.agent);

            match proposal {
                Proposal::Dimensions { dimensions, .. } => {
                    if locked_by_other(state, "dimensions", &response.agent) {
                        tracing::debug!(agent = %response.agent, "dimensions locked; proposal skipped");
                        continue;
                    }
                    let patch = DesignPatch {
                        dimensions: Some(*dimensions),
                        ..Default::default()
                    };
                    state.update_design(&response.agent, &patch, Some(&reason));
                }
                Proposal::Materials {
                    materials,
                    estimated_cost,
                    alternatives,
                } => {
                    if locked_by_other(state, "materials", &response.agent) {
                        tracing::debug!(agent = %response.agent, "materials locked; proposal skipped");
                        continue;
                    }
                    let patch = DesignPatch {
                        materials: Some(materials.clone()),
                        estimated_cost: *estimated_cost,
                        ..Default::default()
                    };
                    state.update_design(&response.agent, &patch, Some(&reason));
                    if !alternatives.is_empty() {
                        let mut constraints = Constraints::default();
                        constraints
                            .material
                            .insert("alternatives".to_string(), json!(alternatives));
                        state.update_constraints(&response.agent, &constraints, Some(&reason));
                    }
                }
                Proposal::Joinery { methods, .. } => {
                    if locked_by_other(state, "joinery", &response.agent) {
                        tracing::debug!(agent = %response.agent, "joinery locked; proposal skipped");
                        continue;
                    }
                    let patch = DesignPatch {
                        joinery: Some(methods.clone()),
                        ..Default::default()
                    };
                    state.update_design(&response.agent, &patch, Some(&reason));
                }
                Proposal::Validation { result } => {
                    // A verdict only lands on a complete-enough design;
                    // against a partial one the gap list still flows back
                    // through the response, but nothing is stored.
                    if !state.snapshot().design.ready_for_validation() {
                        tracing::debug!(
                            agent = %response.agent,
                            "design incomplete; validation verdict not stored"
                        );
                        continue;
                    }
                    let status = if result.valid {
                        ValidationStatus::Valid
                    } else {
                        ValidationStatus::Invalid
                    };
                    state.set_validation_result(&response.agent, result.clone());
                    let patch = DesignPatch {
                        validation_status: Some(status),
                        ..Default::default()
                    };
                    state.update_design(&response.agent, &patch, Some(&reason));
                }
            }
        }
    }

    /// Derived constraints: difficult materials need thicker stock, and a
    /// large projected volume loosens the material budget ceiling.
    fn propagate_constraints(&self, snapshot: &DesignSnapshot, state: &SharedDesignState) {
        let mut patch = Constraints::default();
        let mut reasons = Vec::new();

        let difficult = snapshot
            .design
            .materials
            .iter()
            .filter_map(|name| rules::material_spec(name))
            .any(|spec| spec.workability == rules::Workability::Difficult);
        if difficult {
            patch.structural.insert(
                "min_thickness_in".to_string(),
                json!(rules::DIFFICULT_MIN_THICKNESS_IN),
            );
            reasons.push("difficult workability material");
        }

        if let Some(dimensions) = snapshot.design.dimensions {
            let board_feet = rules::estimate_board_feet(&dimensions);
            if board_feet > self.board_feet_budget_threshold {
                let base = snapshot
                    .constraints
                    .budget
                    .get("max_material_cost")
                    .and_then(Value::as_f64)
                    .or_else(|| snapshot.constraints.max_total_cost());
                if let Some(base) = base {
                    patch.budget.insert(
                        "max_material_cost".to_string(),
                        json!(base * rules::BUDGET_SCALE_FACTOR),
                    );
                    reasons.push("projected board feet above threshold");
                }
            }
        }

        if !patch.is_empty() {
            let reason = reasons.join("; ");
            state.update_constraints(COORDINATOR_AGENT, &patch, Some(&reason));
        }
    }
}

fn locked_by_other(state: &SharedDesignState, property: &str, agent: &str) -> bool {
    if !state.is_locked(property) {
        return false;
    }
    state
        .snapshot()
        .locks
        .get(property)
        .map(|lock| lock.agent != agent)
        .unwrap_or(false)
}

/// Material/joinery pairings the fixed rule table rejects
fn check_material_joinery(snapshot: &DesignSnapshot) -> Vec<ConflictResolution> {
    let design = &snapshot.design;
    let mut conflicts = Vec::new();
    for material in &design.materials {
        for joinery in &design.joinery {
            if let Some(recommended) = rules::joinery_recommendation(material, joinery) {
                conflicts.push(ConflictResolution {
                    kind: ConflictKind::MaterialJoineryIncompatibility,
                    description: format!("{} joinery will not hold in {}", joinery, material),
                    resolution: format!("use {} joinery instead of {}", recommended, joinery),
                    recommended: json!({ "joinery": recommended, "replaces": joinery }),
                    confidence: 0.85,
                });
            }
        }
    }
    conflicts
}

/// Tall-and-narrow shapes get a recommended minimum width
fn check_stability(snapshot: &DesignSnapshot) -> Vec<ConflictResolution> {
    let Some(dimensions) = snapshot.design.dimensions else {
        return Vec::new();
    };
    let footprint = dimensions.min_footprint();
    if footprint <= 0.0 || dimensions.height / footprint <= rules::STABILITY_RATIO_LIMIT {
        return Vec::new();
    }
    let min_width = (dimensions.height / rules::STABILITY_WIDTH_DIVISOR).ceil();
    // A width already at or past the recommended minimum is stable
    // enough; only a shortfall is a conflict.
    if dimensions.width >= min_width {
        return Vec::new();
    }
    vec![ConflictResolution {
        kind: ConflictKind::DimensionStability,
        description: format!(
            "{}\" tall on a {}\" footprint is at risk of tipping",
            dimensions.height, footprint
        ),
        resolution: format!("widen to at least {}\"", min_width),
        recommended: json!({ "min_width": min_width }),
        confidence: 0.75,
    }]
}

/// Material estimate measured against the budget ceiling; with no
/// estimate or no ceiling there is nothing to check, which is also how a
/// failed check reads: no conflict found.
fn check_budget(snapshot: &DesignSnapshot) -> Vec<ConflictResolution> {
    let Some(estimate) = rules::estimate_material_cost(&snapshot.design) else {
        return Vec::new();
    };
    let Some(ceiling) = snapshot.constraints.max_total_cost() else {
        return Vec::new();
    };
    if estimate <= ceiling {
        return Vec::new();
    }

    let alternative = snapshot
        .constraints
        .material
        .get("alternatives")
        .and_then(|value| value.get(0))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            snapshot
                .design
                .materials
                .iter()
                .find_map(|name| rules::material_spec(name))
                .and_then(|spec| spec.alternatives.first())
                .map(|name| name.to_string())
        })
        .unwrap_or_else(|| rules::FALLBACK_MATERIAL.to_string());

    vec![ConflictResolution {
        kind: ConflictKind::BudgetExceeded,
        description: format!(
            "estimated material cost ${:.0} exceeds the ${:.0} ceiling",
            estimate, ceiling
        ),
        resolution: format!("switch to {} to bring the cost down", alternative),
        recommended: json!({
            "material": alternative,
            "estimated_cost": estimate,
            "ceiling": ceiling,
        }),
        confidence: 0.7,
    }]
}

/// Record one resolution as a coordinator decision. A re-recorded
/// decision folds the prior value in under `supersedes` instead of
/// silently overwriting it.
fn record_resolution(
    conflict: &ConflictResolution,
    snapshot: &DesignSnapshot,
    state: &SharedDesignState,
) {
    let mut value = json!({
        "description": conflict.description,
        "resolution": conflict.resolution,
        "recommended": conflict.recommended,
    });
    let key = format!("{}_{}", COORDINATOR_AGENT, conflict.kind.as_str());
    if let Some(previous) = snapshot.decisions.get(&key) {
        value["supersedes"] = previous.value.clone();
    }
    state.record_decision(
        COORDINATOR_AGENT,
        conflict.kind.as_str(),
        value,
        &conflict.description,
        conflict.confidence,
    );
}

/// Material/joinery resolutions are concrete enough to apply directly:
/// the rejected method is swapped for the recommended one. Stability and
/// budget resolutions stay recommendations on user-owned fields.
fn apply_joinery_resolutions(conflicts: &[ConflictResolution], state: &SharedDesignState) {
    let replacements: Vec<(&str, &str)> = conflicts
        .iter()
        .filter(|c| c.kind == ConflictKind::MaterialJoineryIncompatibility)
        .filter_map(|c| {
            let replaces = c.recommended.get("replaces").and_then(Value::as_str)?;
            let joinery = c.recommended.get("joinery").and_then(Value::as_str)?;
            Some((replaces, joinery))
        })
        .collect();
    if replacements.is_empty() {
        return;
    }

    // Rebuild keeping first occurrences: several rejected methods may
    // map to the same replacement.
    let mut joinery: Vec<String> = Vec::new();
    for mut method in state.snapshot().design.joinery {
        for (replaces, replacement) in &replacements {
            if method.eq_ignore_ascii_case(replaces) {
                method = replacement.to_string();
            }
        }
        if !joinery.contains(&method) {
            joinery.push(method);
        }
    }

    let patch = DesignPatch {
        joinery: Some(joinery),
        ..Default::default()
    };
    state.update_design(COORDINATOR_AGENT, &patch, Some("conflict resolution"));
}

/// Stylistic annotations and loose proportion checks; advisory only
fn validate_coherence(snapshot: &DesignSnapshot) -> Vec<String> {
    let design = &snapshot.design;
    let mut issues = Vec::new();

    if let Some(style) = design.style.as_deref() {
        let style = style.to_ascii_lowercase();
        for joinery in &design.joinery {
            if rules::STYLE_JOINERY_MISMATCH
                .iter()
                .any(|(s, j)| *s == style && j.eq_ignore_ascii_case(joinery))
            {
                issues.push(format!(
                    "{} joinery reads as traditional against a {} style",
                    joinery, style
                ));
            }
        }
        for material in &design.materials {
            if rules::STYLE_MATERIAL_MISMATCH
                .iter()
                .any(|(s, m)| *s == style && m.eq_ignore_ascii_case(material))
            {
                issues.push(format!("{} sits oddly with a {} style", material, style));
            }
        }
    }

    if let Some(dimensions) = design.dimensions {
        if dimensions.height > 0.0 {
            let ratio = dimensions.width / dimensions.height;
            if !(0.2..=5.0).contains(&ratio) {
                issues.push("width-to-height proportions look extreme".to_string());
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dimensions, ValidationResult};
    use crate::state::SharedDesignState;
    use chrono::Utc;

    fn state_with(patch: DesignPatch) -> SharedDesignState {
        let state = SharedDesignState::default();
        state.update_design("test", &patch, None);
        state
    }

    #[test]
    fn test_mdf_dovetail_yields_exactly_one_incompatibility() {
        let state = state_with(DesignPatch {
            materials: Some(vec!["mdf".to_string()]),
            joinery: Some(vec!["dovetail".to_string()]),
            ..Default::default()
        });

        let report = CohesionCoordinator::default().harmonize(&[], &state);

        assert_eq!(report.conflicts.len(), 1);
        let conflict = &report.conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::MaterialJoineryIncompatibility);
        assert_eq!(conflict.recommended["joinery"], "pocket-hole");
        // the concrete resolution is applied and recorded as a decision
        assert_eq!(
            report.final_state.design.joinery,
            vec!["pocket-hole".to_string()]
        );
        assert!(report
            .final_state
            .decisions
            .contains_key("cohesion_material_joinery_incompatibility"));
        assert!(!report.harmonized);
    }

    #[test]
    fn test_stability_check_fires_at_ratio_above_three() {
        let state = state_with(DesignPatch {
            dimensions: Some(Dimensions::new(10.0, 40.0, 10.0)),
            ..Default::default()
        });

        let report = CohesionCoordinator::default().harmonize(&[], &state);

        let stability: Vec<_> = report
            .conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::DimensionStability)
            .collect();
        assert_eq!(stability.len(), 1);
        assert_eq!(stability[0].recommended["min_width"], 16.0);
    }

    #[test]
    fn test_budget_overrun_yields_exactly_one_conflict() {
        let state = state_with(DesignPatch {
            materials: Some(vec!["walnut".to_string()]),
            estimated_cost: Some(500.0),
            ..Default::default()
        });
        let mut budget = Constraints::default();
        budget
            .budget
            .insert("max_total_cost".to_string(), json!(300));
        state.update_constraints("test", &budget, None);

        let report = CohesionCoordinator::default().harmonize(&[], &state);

        let budget_conflicts: Vec<_> = report
            .conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::BudgetExceeded)
            .collect();
        assert_eq!(budget_conflicts.len(), 1);
        assert_eq!(budget_conflicts[0].recommended["material"], "cherry");
    }

    #[test]
    fn test_compatible_design_harmonizes() {
        let state = state_with(DesignPatch {
            furniture_type: Some("bookshelf".to_string()),
            dimensions: Some(Dimensions::new(36.0, 72.0, 12.0)),
            materials: Some(vec!["oak".to_string()]),
            joinery: Some(vec!["dado".to_string()]),
            ..Default::default()
        });

        let report = CohesionCoordinator::default().harmonize(&[], &state);
        assert!(report.harmonized);
        assert!(report.conflicts.is_empty());
        assert!(report.coherence_issues.is_empty());
    }

    #[test]
    fn test_coherence_annotates_without_conflicting() {
        let state = state_with(DesignPatch {
            materials: Some(vec!["oak".to_string()]),
            joinery: Some(vec!["dovetail".to_string()]),
            style: Some("modern".to_string()),
            ..Default::default()
        });

        let report = CohesionCoordinator::default().harmonize(&[], &state);
        assert!(report.conflicts.is_empty());
        assert_eq!(report.coherence_issues.len(), 1);
        assert!(!report.harmonized);
    }

    #[test]
    fn test_difficult_material_raises_thickness_constraint() {
        let state = state_with(DesignPatch {
            materials: Some(vec!["maple".to_string()]),
            ..Default::default()
        });

        let report = CohesionCoordinator::default().harmonize(&[], &state);
        assert_eq!(
            report.final_state.constraints.structural["min_thickness_in"],
            json!(rules::DIFFICULT_MIN_THICKNESS_IN)
        );
    }

    #[test]
    fn test_rerecorded_resolution_layers_prior_value() {
        let state = state_with(DesignPatch {
            materials: Some(vec!["mdf".to_string()]),
            joinery: Some(vec!["dovetail".to_string()]),
            ..Default::default()
        });
        let coordinator = CohesionCoordinator::default();
        coordinator.harmonize(&[], &state);

        // reintroduce the bad pairing and harmonize again
        state.update_design(
            "test",
            &DesignPatch {
                joinery: Some(vec!["dovetail".to_string()]),
                ..Default::default()
            },
            None,
        );
        coordinator.harmonize(&[], &state);

        let value = state
            .decision_value(COORDINATOR_AGENT, "material_joinery_incompatibility")
            .unwrap();
        assert!(value.get("supersedes").is_some());
    }

    #[test]
    fn test_merge_applies_proposals_and_validation_slot() {
        let state = state_with(DesignPatch {
            furniture_type: Some("bookshelf".to_string()),
            materials: Some(vec!["mdf".to_string()]),
            joinery: Some(vec!["pocket-hole".to_string()]),
            ..Default::default()
        });
        let responses = vec![
            AgentResponse::new("dimension").with_proposal(Proposal::Dimensions {
                dimensions: Dimensions::new(36.0, 72.0, 12.0),
                rationale: "preset".to_string(),
            }),
            AgentResponse::new("validation").with_proposal(Proposal::Validation {
                result: ValidationResult {
                    agent: "validation".to_string(),
                    valid: false,
                    issues: vec!["a dimension exceeds 120 inches".to_string()],
                    score: 0.8,
                    checked_at: Utc::now(),
                },
            }),
        ];

        let report = CohesionCoordinator::default().harmonize(&responses, &state);
        assert!(report.final_state.design.dimensions.is_some());
        assert!(report.final_state.validation_results.contains_key("validation"));
        assert_eq!(
            report.final_state.design.validation_status,
            ValidationStatus::Invalid
        );
    }

    #[test]
    fn test_verdict_not_stored_against_incomplete_design() {
        let state = SharedDesignState::default();
        let responses = vec![AgentResponse::new("validation").with_proposal(
            Proposal::Validation {
                result: ValidationResult {
                    agent: "validation".to_string(),
                    valid: false,
                    issues: vec!["no materials selected".to_string()],
                    score: 0.2,
                    checked_at: Utc::now(),
                },
            },
        )];

        let report = CohesionCoordinator::default().harmonize(&responses, &state);
        assert!(report.final_state.validation_results.is_empty());
        assert_eq!(
            report.final_state.design.validation_status,
            ValidationStatus::NotValidated
        );
    }

    #[test]
    fn test_converging_replacements_keep_one_method() {
        let state = state_with(DesignPatch {
            materials: Some(vec!["mdf".to_string()]),
            joinery: Some(vec![
                "dovetail".to_string(),
                "dado".to_string(),
                "mortise-tenon".to_string(),
            ]),
            ..Default::default()
        });

        let report = CohesionCoordinator::default().harmonize(&[], &state);

        assert_eq!(report.conflicts.len(), 2);
        assert_eq!(
            report.final_state.design.joinery,
            vec!["pocket-hole".to_string(), "dado".to_string()]
        );
    }

    #[test]
    fn test_lock_held_by_another_agent_skips_proposal() {
        let state = SharedDesignState::default();
        state.lock("user", "dimensions");

        let responses = vec![AgentResponse::new("dimension").with_proposal(
            Proposal::Dimensions {
                dimensions: Dimensions::new(36.0, 72.0, 12.0),
                rationale: "preset".to_string(),
            },
        )];
        let report = CohesionCoordinator::default().harmonize(&responses, &state);
        assert!(report.final_state.design.dimensions.is_none());
    }
}
