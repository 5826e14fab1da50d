//! # Validation Agent
//!
//! Structural and completeness review over a snapshot. Produces the
//! per-agent [`ValidationResult`] slot the orchestrator stores; never
//! mutates state itself.

use crate::agents::SpecialistAgent;
use crate::harmony::rules;
use crate::model::{AgentResponse, Proposal, ValidationResult};
use crate::state::DesignSnapshot;
use async_trait::async_trait;
use chrono::Utc;

const HANDLE_KEYWORDS: &[&str] = &[
    "validate", "valid", "check", "review", "ready", "finish", "complete", "sound",
];

/// Each finding costs this much of the score
const ISSUE_PENALTY: f64 = 0.2;

pub struct ValidationAgent;

impl ValidationAgent {
    fn review(snapshot: &DesignSnapshot) -> Vec<String> {
        let design = &snapshot.design;
        let mut issues = Vec::new();

        if design.furniture_type.is_none() {
            issues.push("no furniture type has been chosen".to_string());
        }
        if design.materials.is_empty() {
            issues.push("no materials selected".to_string());
        }
        if design.joinery.is_empty() {
            issues.push("no joinery method selected".to_string());
        }

        match design.dimensions {
            None => issues.push("dimensions are not set".to_string()),
            Some(dimensions) => {
                if dimensions.width <= 0.0 || dimensions.height <= 0.0 || dimensions.depth <= 0.0 {
                    issues.push("dimensions must all be positive".to_string());
                } else {
                    if dimensions.width > 120.0
                        || dimensions.height > 120.0
                        || dimensions.depth > 120.0
                    {
                        issues.push("a dimension exceeds 120 inches".to_string());
                    }
                    let footprint = dimensions.min_footprint();
                    if footprint > 0.0
                        && dimensions.height / footprint > rules::STABILITY_RATIO_LIMIT
                        && dimensions.width
                            < (dimensions.height / rules::STABILITY_WIDTH_DIVISOR).ceil()
                    {
                        issues.push(
                            "tall and narrow; consider a wider footprint or wall anchoring"
                                .to_string(),
                        );
                    }
                }
            }
        }

        for material in &design.materials {
            if rules::material_spec(material).is_none() {
                issues.push(format!("unrecognized material '{}'", material));
            }
            for joinery in &design.joinery {
                if let Some(recommended) = rules::joinery_recommendation(material, joinery) {
                    issues.push(format!(
                        "{} joinery will not hold in {}; {} would",
                        joinery, material, recommended
                    ));
                }
            }
        }
        for joinery in &design.joinery {
            if !rules::known_joinery(joinery) {
                issues.push(format!("unrecognized joinery method '{}'", joinery));
            }
        }

        issues
    }
}

#[async_trait]
impl SpecialistAgent for ValidationAgent {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn can_handle(&self, input: &str, _snapshot: &DesignSnapshot) -> bool {
        let lowered = input.to_ascii_lowercase();
        HANDLE_KEYWORDS.iter().any(|k| lowered.contains(k))
    }

    async fn process(
        &self,
        _input: &str,
        snapshot: &DesignSnapshot,
    ) -> anyhow::Result<AgentResponse> {
        let issues = Self::review(snapshot);
        let result = ValidationResult {
            agent: self.name().to_string(),
            valid: issues.is_empty(),
            issues: issues.clone(),
            score: (1.0 - ISSUE_PENALTY * issues.len() as f64).max(0.0),
            checked_at: Utc::now(),
        };

        let mut response = AgentResponse::new(self.name());
        response.validation_issues = issues;
        response.proposal = Some(Proposal::Validation { result });
        Ok(response)
    }
}
