//! # Dimension Agent
//!
//! Extracts sizing from the user's words: `W x H x D` triples, labeled
//! single measurements ("40 inches tall"), and the per-furniture-type
//! presets used when the user has a type in mind but no numbers yet.

use crate::agents::SpecialistAgent;
use crate::model::{AgentResponse, Dimensions, Proposal};
use crate::state::DesignSnapshot;
use async_trait::async_trait;
use regex::Regex;

const CM_PER_INCH: f64 = 2.54;

/// Generic base when neither the snapshot nor a preset gives a starting
/// point for a partially specified size
const GENERIC_BASE: Dimensions = Dimensions {
    width: 24.0,
    height: 30.0,
    depth: 16.0,
};

/// Typical outer dimensions per furniture type, W x H x D in inches
const PRESETS: &[(&str, Dimensions)] = &[
    ("bookshelf", Dimensions { width: 36.0, height: 72.0, depth: 12.0 }),
    ("table", Dimensions { width: 60.0, height: 30.0, depth: 36.0 }),
    ("desk", Dimensions { width: 60.0, height: 30.0, depth: 30.0 }),
    ("cabinet", Dimensions { width: 36.0, height: 34.0, depth: 24.0 }),
    ("dresser", Dimensions { width: 60.0, height: 34.0, depth: 20.0 }),
    ("nightstand", Dimensions { width: 20.0, height: 24.0, depth: 16.0 }),
    ("bench", Dimensions { width: 48.0, height: 18.0, depth: 14.0 }),
    ("chair", Dimensions { width: 18.0, height: 34.0, depth: 18.0 }),
];

pub fn preset_for(furniture_type: &str) -> Option<Dimensions> {
    PRESETS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(furniture_type.trim()))
        .map(|(_, dimensions)| *dimensions)
}

/// True when the input carries any digit, a cheap signal that a
/// measurement may be present even without dimension vocabulary
pub fn mentions_numbers(input: &str) -> bool {
    input.chars().any(|c| c.is_ascii_digit())
}

const HANDLE_KEYWORDS: &[&str] = &[
    "dimension", "size", "wide", "width", "tall", "height", "high", "deep", "depth", "big",
    "small", "footprint",
];

pub struct DimensionAgent;

impl DimensionAgent {
    fn parse_triple(input: &str) -> Option<Dimensions> {
        let re = Regex::new(
            r"(?i)(\d+(?:\.\d+)?)\s*(?:x|by|×)\s*(\d+(?:\.\d+)?)\s*(?:x|by|×)\s*(\d+(?:\.\d+)?)",
        )
        .ok()?;
        let captures = re.captures(input)?;
        let mut values = [0.0f64; 3];
        for (index, slot) in values.iter_mut().enumerate() {
            *slot = captures.get(index + 1)?.as_str().parse().ok()?;
        }
        let scale = if metric(input) { 1.0 / CM_PER_INCH } else { 1.0 };
        Some(Dimensions::new(
            values[0] * scale,
            values[1] * scale,
            values[2] * scale,
        ))
    }

    /// Apply labeled single measurements onto `base`; returns `None` when
    /// nothing labeled was found.
    fn parse_labeled(input: &str, base: Dimensions) -> Option<Dimensions> {
        let re = Regex::new(
            r#"(?i)(\d+(?:\.\d+)?)\s*(?:"|in(?:ch(?:es)?)?|cm)?\s*(wide|tall|high|deep|long)"#,
        )
        .ok()?;
        let scale = if metric(input) { 1.0 / CM_PER_INCH } else { 1.0 };
        let mut dimensions = base;
        let mut matched = false;
        for captures in re.captures_iter(input) {
            let value: f64 = match captures.get(1).and_then(|m| m.as_str().parse().ok()) {
                Some(v) => v,
                None => continue,
            };
            let value = value * scale;
            match captures.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
                Some(label) if label == "wide" || label == "long" => dimensions.width = value,
                Some(label) if label == "tall" || label == "high" => dimensions.height = value,
                Some(label) if label == "deep" => dimensions.depth = value,
                _ => continue,
            }
            matched = true;
        }
        matched.then_some(dimensions)
    }
}

fn metric(input: &str) -> bool {
    input.to_ascii_lowercase().contains("cm")
}

#[async_trait]
impl SpecialistAgent for DimensionAgent {
    fn name(&self) -> &'static str {
        "dimension"
    }

    fn can_handle(&self, input: &str, _snapshot: &DesignSnapshot) -> bool {
        let lowered = input.to_ascii_lowercase();
        lowered.chars().any(|c| c.is_ascii_digit())
            || HANDLE_KEYWORDS.iter().any(|k| lowered.contains(k))
    }

    async fn process(
        &self,
        input: &str,
        snapshot: &DesignSnapshot,
    ) -> anyhow::Result<AgentResponse> {
        let furniture_type = snapshot.design.furniture_type.as_deref();
        let base = snapshot
            .design
            .dimensions
            .or_else(|| furniture_type.and_then(preset_for))
            .unwrap_or(GENERIC_BASE);

        let parsed = Self::parse_triple(input)
            .map(|dimensions| (dimensions, "parsed as width x height x depth"))
            .or_else(|| {
                Self::parse_labeled(input, base)
                    .map(|dimensions| (dimensions, "adjusted from the labeled measurements"))
            });

        let mut response = AgentResponse::new(self.name());
        match parsed {
            Some((dimensions, rationale)) => {
                if dimensions.width <= 0.0 || dimensions.height <= 0.0 || dimensions.depth <= 0.0 {
                    response.success = false;
                    response
                        .validation_issues
                        .push("dimensions must all be positive".to_string());
                    return Ok(response);
                }
                if dimensions.width > 120.0 || dimensions.height > 120.0 || dimensions.depth > 120.0
                {
                    response
                        .validation_issues
                        .push("one dimension exceeds 120 inches; double-check the units".to_string());
                }
                response.proposal = Some(Proposal::Dimensions {
                    dimensions,
                    rationale: rationale.to_string(),
                });
            }
            None => {
                let suggestion = match furniture_type.and_then(preset_for) {
                    Some(preset) if snapshot.design.dimensions.is_none() => format!(
                        "A typical {} is {:.0} x {:.0} x {:.0} inches - say the word or give your own size",
                        furniture_type.unwrap_or_default(),
                        preset.width,
                        preset.height,
                        preset.depth
                    ),
                    _ => "What dimensions do you have in mind (width x height x depth)?".to_string(),
                };
                response.suggestions.push(suggestion);
            }
        }
        Ok(response)
    }
}
