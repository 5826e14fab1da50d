//! # Response Synthesis
//!
//! Turns one turn's agent responses, conflicts, and state snapshot into
//! the user-facing text, progress figure, and suggestion list.

use crate::harmony::HarmonyReport;
use crate::model::{AgentResponse, Change, Proposal};
use crate::state::DesignSnapshot;

use super::intent::Intent;

/// Core fields counted toward progress, in suggestion priority order
const CORE_FIELD_COUNT: u8 = 5;

pub const MAX_SUGGESTIONS: usize = 3;

/// Progress percentage: populated core fields out of five (type,
/// dimensions, materials, joinery, a passing validation)
pub fn design_progress(snapshot: &DesignSnapshot) -> u32 {
    let populated = snapshot.design.populated_core_fields();
    (u32::from(populated) * 100) / u32::from(CORE_FIELD_COUNT)
}

/// Intent-specific opening line
fn opening(intent: Intent, snapshot: &DesignSnapshot) -> String {
    let piece = snapshot
        .design
        .furniture_type
        .as_deref()
        .unwrap_or("your piece");
    match intent {
        Intent::CreateFurniture => format!("Let's design your {}.", piece),
        Intent::AdjustDimensions => format!("Updating the dimensions of {}.", piece),
        Intent::SelectMaterials => format!("Looking at materials for {}.", piece),
        Intent::SelectJoinery => format!("Working out the joinery for {}.", piece),
        Intent::RequestValidation => format!("Reviewing {} for build-readiness.", piece),
        Intent::StatusQuery => format!("Here's where {} stands.", piece),
        Intent::Unclear => {
            "I'm not sure what you'd like to change, but here's what I can offer.".to_string()
        }
    }
}

/// One formatted line per successful agent response
fn agent_summary(response: &AgentResponse) -> Option<String> {
    let proposal = response.proposal.as_ref()?;
    let line = match proposal {
        Proposal::Dimensions { dimensions, rationale } => format!(
            "Dimensions: {}\" wide x {}\" tall x {}\" deep ({}).",
            dimensions.width, dimensions.height, dimensions.depth, rationale
        ),
        Proposal::Materials {
            materials,
            estimated_cost,
            ..
        } => {
            let list = materials.join(", ");
            match estimated_cost {
                Some(cost) => format!("Materials: {} (about ${:.0} in lumber).", list, cost),
                None => format!("Materials: {}.", list),
            }
        }
        Proposal::Joinery { methods, rationale } => {
            format!("Joinery: {} ({}).", methods.join(", "), rationale)
        }
        Proposal::Validation { result } => {
            if result.valid {
                format!("Validation passed with a score of {:.1}.", result.score)
            } else {
                format!(
                    "Validation found {} issue(s), score {:.1}.",
                    result.issues.len(),
                    result.score
                )
            }
        }
    };
    Some(line)
}

/// One line per recalled change, oldest first
fn change_line(change: &Change) -> String {
    match change.reason.as_deref() {
        Some(reason) => format!("- {} updated {} ({})", change.agent, change.property_path, reason),
        None => format!("- {} updated {}", change.agent, change.property_path),
    }
}

/// Assemble the full response text: opening, per-agent summaries,
/// recent activity (status turns), conflict bullets, validation issues,
/// progress line.
pub fn synthesize(
    intent: Intent,
    responses: &[AgentResponse],
    report: &HarmonyReport,
    recent_changes: &[Change],
) -> String {
    let snapshot = &report.final_state;
    let mut parts = vec![opening(intent, snapshot)];

    if !recent_changes.is_empty() {
        parts.push("Recent changes:".to_string());
        for change in recent_changes {
            parts.push(change_line(change));
        }
    }

    for response in responses.iter().filter(|r| r.success) {
        if let Some(line) = agent_summary(response) {
            parts.push(line);
        }
    }

    if !report.conflicts.is_empty() {
        parts.push("A few things needed reconciling:".to_string());
        for conflict in &report.conflicts {
            parts.push(format!("- {}: {}", conflict.description, conflict.resolution));
        }
    }

    for issue in &report.coherence_issues {
        parts.push(format!("- Note: {}", issue));
    }

    let validation_issues: Vec<&String> = responses
        .iter()
        .flat_map(|r| r.validation_issues.iter())
        .collect();
    if !validation_issues.is_empty() {
        parts.push("Open issues:".to_string());
        for issue in validation_issues {
            parts.push(format!("- {}", issue));
        }
    }

    parts.push(format!("Design progress: {}%.", design_progress(snapshot)));
    parts.join("\n")
}

/// Clarification prompt for the first unmet core field, in fixed order
fn next_step_prompt(snapshot: &DesignSnapshot) -> Option<String> {
    let design = &snapshot.design;
    if design.furniture_type.is_none() {
        Some("What kind of furniture would you like to build?".to_string())
    } else if design.dimensions.is_none() {
        Some("What size should it be? Give width x height x depth in inches.".to_string())
    } else if design.materials.is_empty() {
        Some("What wood would you like? Pine and oak are popular choices.".to_string())
    } else if design.joinery.is_empty() {
        Some("How should the parts join? I can suggest methods that suit the material.".to_string())
    } else {
        None
    }
}

/// Union of agent suggestions plus the clarification prompt,
/// de-duplicated, the prompt first, capped at `MAX_SUGGESTIONS`.
pub fn build_suggestions(
    responses: &[AgentResponse],
    snapshot: &DesignSnapshot,
    cap: usize,
) -> Vec<String> {
    let mut suggestions = Vec::new();
    if let Some(prompt) = next_step_prompt(snapshot) {
        suggestions.push(prompt);
    }
    for response in responses {
        for suggestion in &response.suggestions {
            if !suggestions.contains(suggestion) {
                suggestions.push(suggestion.clone());
            }
        }
    }
    if suggestions.is_empty() {
        suggestions.push("Ask for a validation check whenever you're ready.".to_string());
    }
    suggestions.truncate(cap);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DesignPatch, Dimensions};
    use crate::state::SharedDesignState;

    fn snapshot_with(patch: DesignPatch) -> DesignSnapshot {
        let state = SharedDesignState::default();
        state.update_design("test", &patch, None);
        state.snapshot()
    }

    #[test]
    fn test_progress_counts_core_fields() {
        let snapshot = snapshot_with(DesignPatch {
            furniture_type: Some("bookshelf".to_string()),
            dimensions: Some(Dimensions::new(36.0, 72.0, 12.0)),
            materials: Some(vec!["oak".to_string()]),
            ..Default::default()
        });
        assert_eq!(design_progress(&snapshot), 60);
        assert_eq!(design_progress(&SharedDesignState::default().snapshot()), 0);
    }

    #[test]
    fn test_suggestions_lead_with_first_unmet_field_and_cap() {
        let snapshot = SharedDesignState::default().snapshot();
        let responses = vec![
            crate::model::AgentResponse::new("a")
                .with_suggestion("one")
                .with_suggestion("two"),
            crate::model::AgentResponse::new("b")
                .with_suggestion("two")
                .with_suggestion("three"),
        ];
        let suggestions = build_suggestions(&responses, &snapshot, MAX_SUGGESTIONS);
        assert_eq!(suggestions.len(), 3);
        assert!(suggestions[0].contains("kind of furniture"));
        assert_eq!(suggestions[1], "one");
        assert_eq!(suggestions[2], "two");
    }

    #[test]
    fn test_status_response_recalls_recent_changes() {
        let state = SharedDesignState::default();
        state.update_design(
            "material",
            &DesignPatch {
                materials: Some(vec!["oak".to_string()]),
                ..Default::default()
            },
            Some("user picked oak"),
        );
        let report = crate::harmony::CohesionCoordinator::default().harmonize(&[], &state);
        let recent = state.recent_changes(3);

        let text = synthesize(Intent::StatusQuery, &[], &report, &recent);
        assert!(text.contains("Recent changes:"));
        assert!(text.contains("user picked oak"));
    }

    #[test]
    fn test_suggestions_never_empty() {
        let snapshot = snapshot_with(DesignPatch {
            furniture_type: Some("bench".to_string()),
            dimensions: Some(Dimensions::new(48.0, 18.0, 14.0)),
            materials: Some(vec!["pine".to_string()]),
            joinery: Some(vec!["mortise-tenon".to_string()]),
            ..Default::default()
        });
        let suggestions = build_suggestions(&[], &snapshot, MAX_SUGGESTIONS);
        assert_eq!(suggestions.len(), 1);
    }
}
