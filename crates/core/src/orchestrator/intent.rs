//! # Intent Classification
//!
//! Keyword-driven classification of user input into routing categories,
//! plus extraction of the furniture type and style the input mentions.
//! Deterministic by design; an optional reasoning call may refine an
//! `Unclear` result but never replaces this path.

use serde::{Deserialize, Serialize};

/// Routing category for one turn of user input
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Start or restart a piece ("I want a bookshelf")
    CreateFurniture,
    /// Change size ("make it 36 inches wide")
    AdjustDimensions,
    /// Pick or change wood ("use oak instead")
    SelectMaterials,
    /// Pick or change joinery ("dovetail the drawers")
    SelectJoinery,
    /// Ask for a design review
    RequestValidation,
    /// Ask where the design stands
    StatusQuery,
    /// Nothing recognizable; agents are polled instead
    Unclear,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::CreateFurniture => "create_furniture",
            Intent::AdjustDimensions => "adjust_dimensions",
            Intent::SelectMaterials => "select_materials",
            Intent::SelectJoinery => "select_joinery",
            Intent::RequestValidation => "request_validation",
            Intent::StatusQuery => "status_query",
            Intent::Unclear => "unclear",
        }
    }

    /// Parse a category label, e.g. from a reasoning call's output
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "create_furniture" => Some(Intent::CreateFurniture),
            "adjust_dimensions" => Some(Intent::AdjustDimensions),
            "select_materials" => Some(Intent::SelectMaterials),
            "select_joinery" => Some(Intent::SelectJoinery),
            "request_validation" => Some(Intent::RequestValidation),
            "status_query" => Some(Intent::StatusQuery),
            _ => None,
        }
    }
}

/// Static routing table. `None` means the intent has no fixed agent
/// subset and every registered agent's `can_handle` is polled instead.
pub fn routed_agents(intent: Intent) -> Option<&'static [&'static str]> {
    match intent {
        Intent::CreateFurniture => Some(&["dimension", "material", "joinery"]),
        Intent::AdjustDimensions => Some(&["dimension"]),
        Intent::SelectMaterials => Some(&["material"]),
        Intent::SelectJoinery => Some(&["joinery"]),
        Intent::RequestValidation => Some(&["validation"]),
        Intent::StatusQuery => Some(&[]),
        Intent::Unclear => None,
    }
}

const FURNITURE_TYPES: &[&str] = &[
    "bookshelf",
    "bookcase",
    "table",
    "desk",
    "cabinet",
    "dresser",
    "nightstand",
    "bench",
    "chair",
];

const STYLES: &[&str] = &["modern", "rustic", "traditional", "scandinavian", "industrial"];

const MATERIAL_WORDS: &[&str] = &[
    "pine", "oak", "maple", "cherry", "walnut", "poplar", "mdf", "plywood", "wood", "material",
    "lumber", "hardwood",
];

const JOINERY_WORDS: &[&str] = &[
    "dovetail",
    "mortise",
    "tenon",
    "dowel",
    "dado",
    "rabbet",
    "biscuit",
    "pocket hole",
    "pocket screw",
    "box joint",
    "finger joint",
    "joinery",
    "joint",
];

const DIMENSION_WORDS: &[&str] = &[
    "inch", "inches", "\"", "cm", "centimeter", "wide", "tall", "high", "deep", "long", "height",
    "width", "depth", "size", "dimension", "bigger", "smaller", "taller", "shorter", "wider",
];

const VALIDATION_WORDS: &[&str] = &[
    "validate", "valid", "check", "review", "verify", "ready to build", "will it hold",
    "structurally",
];

const STATUS_WORDS: &[&str] = &[
    "status", "progress", "so far", "where are we", "what do we have", "summary", "summarize",
];

/// Classify one line of user input. Never fails; anything unmatched is
/// `Unclear`.
pub fn classify(input: &str) -> Intent {
    let lowered = input.to_ascii_lowercase();
    let contains_any = |words: &[&str]| words.iter().any(|w| lowered.contains(w));

    if contains_any(STATUS_WORDS) {
        return Intent::StatusQuery;
    }
    if contains_any(VALIDATION_WORDS) {
        return Intent::RequestValidation;
    }
    // Naming a piece outranks the detail vocabulary: "a walnut bookshelf
    // 72 inches tall" starts a piece, and the create route fans out to
    // the detail agents anyway.
    if detect_furniture_type(&lowered).is_some() {
        return Intent::CreateFurniture;
    }
    if contains_any(DIMENSION_WORDS) || crate::agents::dimension::mentions_numbers(&lowered) {
        return Intent::AdjustDimensions;
    }
    if contains_any(JOINERY_WORDS) {
        return Intent::SelectJoinery;
    }
    if contains_any(MATERIAL_WORDS) {
        return Intent::SelectMaterials;
    }
    Intent::Unclear
}

/// First furniture type the input names, normalized
pub fn detect_furniture_type(input: &str) -> Option<&'static str> {
    let lowered = input.to_ascii_lowercase();
    FURNITURE_TYPES
        .iter()
        .filter(|name| lowered.contains(**name))
        .min_by_key(|name| lowered.find(**name).unwrap_or(usize::MAX))
        .map(|name| if *name == "bookcase" { "bookshelf" } else { *name })
}

/// First style word the input names, if any
pub fn detect_style(input: &str) -> Option<&'static str> {
    let lowered = input.to_ascii_lowercase();
    STYLES.iter().find(|style| lowered.contains(**style)).copied()
}
