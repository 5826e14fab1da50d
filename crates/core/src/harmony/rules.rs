//! # Cohesion Rules
//!
//! Fixed domain knowledge shared by the specialists and the cohesion
//! pass: material specs, the material/joinery incompatibility table, style
//! mismatch pairs, and the lumber estimate used for budget checks.

use crate::model::{Design, Dimensions};

/// How forgiving a material is to work with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workability {
    Easy,
    Moderate,
    Difficult,
}

/// Static profile of a supported material
#[derive(Debug, Clone, Copy)]
pub struct MaterialSpec {
    pub name: &'static str,
    pub cost_per_board_foot: f64,
    pub workability: Workability,
    /// Cheaper or easier stand-ins, best first
    pub alternatives: &'static [&'static str],
}

pub const MATERIALS: &[MaterialSpec] = &[
    MaterialSpec {
        name: "pine",
        cost_per_board_foot: 4.0,
        workability: Workability::Easy,
        alternatives: &["plywood", "poplar"],
    },
    MaterialSpec {
        name: "poplar",
        cost_per_board_foot: 5.0,
        workability: Workability::Easy,
        alternatives: &["pine"],
    },
    MaterialSpec {
        name: "oak",
        cost_per_board_foot: 8.0,
        workability: Workability::Moderate,
        alternatives: &["maple", "pine"],
    },
    MaterialSpec {
        name: "maple",
        cost_per_board_foot: 10.0,
        workability: Workability::Difficult,
        alternatives: &["oak", "pine"],
    },
    MaterialSpec {
        name: "cherry",
        cost_per_board_foot: 12.0,
        workability: Workability::Moderate,
        alternatives: &["maple", "oak"],
    },
    MaterialSpec {
        name: "walnut",
        cost_per_board_foot: 15.0,
        workability: Workability::Difficult,
        alternatives: &["cherry", "oak"],
    },
    MaterialSpec {
        name: "mdf",
        cost_per_board_foot: 2.5,
        workability: Workability::Easy,
        alternatives: &["plywood", "pine"],
    },
    MaterialSpec {
        name: "plywood",
        cost_per_board_foot: 3.5,
        workability: Workability::Easy,
        alternatives: &["mdf", "pine"],
    },
];

pub fn material_spec(name: &str) -> Option<&'static MaterialSpec> {
    let name = name.trim();
    MATERIALS
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

pub const JOINERY_METHODS: &[&str] = &[
    "dovetail",
    "mortise-tenon",
    "pocket-hole",
    "dado",
    "biscuit",
    "dowel",
    "box-joint",
];

pub fn known_joinery(name: &str) -> bool {
    JOINERY_METHODS
        .iter()
        .any(|method| method.eq_ignore_ascii_case(name.trim()))
}

/// (material, joinery, recommended replacement)
///
/// Fiber-based sheet goods crumble under cut joinery; solid-wood frame
/// joints need long-grain walls that plywood plies do not provide.
pub const INCOMPATIBLE_JOINERY: &[(&str, &str, &str)] = &[
    ("mdf", "dovetail", "pocket-hole"),
    ("mdf", "mortise-tenon", "pocket-hole"),
    ("mdf", "box-joint", "pocket-hole"),
    ("plywood", "mortise-tenon", "dado"),
    ("plywood", "dovetail", "box-joint"),
];

/// Replacement joinery if `material` + `joinery` is a known bad pairing
pub fn joinery_recommendation(material: &str, joinery: &str) -> Option<&'static str> {
    INCOMPATIBLE_JOINERY
        .iter()
        .find(|(m, j, _)| m.eq_ignore_ascii_case(material.trim()) && j.eq_ignore_ascii_case(joinery.trim()))
        .map(|(_, _, recommended)| *recommended)
}

/// (style, joinery) pairings that read as stylistically off
pub const STYLE_JOINERY_MISMATCH: &[(&str, &str)] = &[("modern", "dovetail")];

/// (style, material) pairings that read as stylistically off
pub const STYLE_MATERIAL_MISMATCH: &[(&str, &str)] =
    &[("rustic", "mdf"), ("rustic", "plywood"), ("modern", "pine")];

/// Height over the smaller footprint edge past this ratio risks tipping
pub const STABILITY_RATIO_LIMIT: f64 = 3.0;
/// Recommended minimum width is `ceil(height / STABILITY_WIDTH_DIVISOR)`
pub const STABILITY_WIDTH_DIVISOR: f64 = 2.5;

pub const FALLBACK_MATERIAL: &str = "pine";

/// Nominal stock thickness assumed by the lumber estimate
pub const PANEL_THICKNESS_IN: f64 = 0.75;
/// Minimum stock thickness propagated for difficult-workability materials
pub const DIFFICULT_MIN_THICKNESS_IN: f64 = 1.0;

/// Past this projected volume the material budget ceiling is scaled up
pub const BOARD_FEET_BUDGET_THRESHOLD: f64 = 20.0;
pub const BUDGET_SCALE_FACTOR: f64 = 1.25;

/// Rough carcass estimate in board feet (144 cubic inches each): two
/// sides, top and bottom, and a back panel at nominal stock thickness.
pub fn estimate_board_feet(dimensions: &Dimensions) -> f64 {
    let panel_area = 2.0 * dimensions.height * dimensions.depth
        + 2.0 * dimensions.width * dimensions.depth
        + dimensions.width * dimensions.height;
    panel_area * PANEL_THICKNESS_IN / 144.0
}

/// Material cost estimate for a design: the recorded estimate if one has
/// been proposed, otherwise board feet priced at the first material's rate
pub fn estimate_material_cost(design: &Design) -> Option<f64> {
    if let Some(cost) = design.estimated_cost {
        return Some(cost);
    }
    let dimensions = design.dimensions?;
    let spec = design.materials.iter().find_map(|m| material_spec(m))?;
    Some(estimate_board_feet(&dimensions) * spec.cost_per_board_foot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_lookup_is_case_insensitive() {
        assert_eq!(material_spec("MDF").map(|s| s.name), Some("mdf"));
        assert_eq!(material_spec(" Walnut ").map(|s| s.name), Some("walnut"));
        assert!(material_spec("unobtanium").is_none());
    }

    #[test]
    fn test_incompatibility_table() {
        assert_eq!(joinery_recommendation("mdf", "dovetail"), Some("pocket-hole"));
        assert_eq!(joinery_recommendation("plywood", "mortise-tenon"), Some("dado"));
        assert_eq!(joinery_recommendation("oak", "dovetail"), None);
    }

    #[test]
    fn test_board_feet_estimate_for_bookshelf() {
        let board_feet = estimate_board_feet(&Dimensions::new(36.0, 72.0, 12.0));
        // 2*72*12 + 2*36*12 + 36*72 = 5184 in^2 at 3/4" stock = 27 bf
        assert!((board_feet - 27.0).abs() < 1e-9);
    }

    #[test]
    fn test_cost_estimate_prefers_recorded_estimate() {
        let mut design = Design::default();
        design.dimensions = Some(Dimensions::new(36.0, 72.0, 12.0));
        design.materials = vec!["pine".to_string()];
        assert!((estimate_material_cost(&design).unwrap() - 108.0).abs() < 1e-9);

        design.estimated_cost = Some(500.0);
        assert_eq!(estimate_material_cost(&design), Some(500.0));
    }
}
