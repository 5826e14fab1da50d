//! # Material Agent
//!
//! Recognizes materials named in the input against the fixed species
//! table, prices the current carcass estimate, and carries each pick's
//! listed alternatives forward for the budget conflict check.

use crate::agents::SpecialistAgent;
use crate::harmony::rules::{self, MaterialSpec};
use crate::model::{AgentResponse, Proposal};
use crate::state::DesignSnapshot;
use async_trait::async_trait;

const HANDLE_KEYWORDS: &[&str] = &[
    "material", "wood", "lumber", "board", "cost", "price", "budget", "cheap", "expensive",
];

pub struct MaterialAgent;

impl MaterialAgent {
    /// Materials mentioned in `input`, in mention order
    fn mentioned(input: &str) -> Vec<&'static MaterialSpec> {
        let lowered = input.to_ascii_lowercase();
        let mut found: Vec<(usize, &'static MaterialSpec)> = rules::MATERIALS
            .iter()
            .filter_map(|spec| lowered.find(spec.name).map(|position| (position, spec)))
            .collect();
        found.sort_by_key(|(position, _)| *position);
        found.into_iter().map(|(_, spec)| spec).collect()
    }
}

#[async_trait]
impl SpecialistAgent for MaterialAgent {
    fn name(&self) -> &'static str {
        "material"
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

        if mentioned.is_empty() {
            let suggestion = if snapshot.design.materials.is_empty() {
                "What material are you thinking - pine, oak, walnut, or a sheet good like plywood?"
            } else {
                "Happy to swap materials; name one and I'll re-price the design"
            };
            response.suggestions.push(suggestion.to_string());
            return Ok(response);
        }

        let estimated_cost = snapshot.design.dimensions.map(|dimensions| {
            let board_feet = rules::estimate_board_feet(&dimensions);
            mentioned
                .iter()
                .map(|spec| board_feet * spec.cost_per_board_foot)
                .sum::<f64>()
                / mentioned.len() as f64
        });

        if estimated_cost.is_none() {
            response
                .suggestions
                .push("Give me dimensions and I can estimate the material cost".to_string());
        }

        let primary = mentioned[0];
        response.proposal = Some(Proposal::Materials {
            materials: mentioned.iter().map(|spec| spec.name.to_string()).collect(),
            estimated_cost,
            alternatives: primary
                .alternatives
                .iter()
                .map(|name| name.to_string())
                .collect(),
        });
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DesignPatch, Dimensions};
    use crate::state::SharedDesignState;

    #[tokio::test]
    async fn test_mentions_are_priced_when_dimensions_known() {
        let state = SharedDesignState::default();
        state.update_design(
            "test",
            &DesignPatch {
                dimensions: Some(Dimensions::new(36.0, 72.0, 12.0)),
                ..Default::default()
            },
            None,
        );

        let response = MaterialAgent
            .process("let's use pine", &state.snapshot())
            .await
            .unwrap();
        match response.proposal {
            Some(Proposal::Materials {
                materials,
                estimated_cost,
                alternatives,
            }) => {
                assert_eq!(materials, vec!["pine".to_string()]);
                // 27 board feet at $4/bf
                assert!((estimated_cost.unwrap() - 108.0).abs() < 1e-9);
                assert_eq!(alternatives[0], "plywood");
            }
            other => panic!("expected materials proposal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_material_words_yield_suggestion() {
        let snapshot = SharedDesignState::default().snapshot();
        let response = MaterialAgent
            .process("what wood should I pick?", &snapshot)
            .await
            .unwrap();
        assert!(response.proposal.is_none());
        assert!(!response.suggestions.is_empty());
    }

    #[test]
    fn test_mention_order_is_preserved() {
        let mentioned = MaterialAgent::mentioned("walnut top with an oak base");
        let names: Vec<_> = mentioned.iter().map(|spec| spec.name).collect();
        assert_eq!(names, vec!["walnut", "oak"]);
    }
}
