//! Nutrient identifiers

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Plant nutrients the engine can allocate.
///
/// Ordering is significant: every per-nutrient collection iterates in this
/// order and the optimizer breaks score ties by it, which keeps results
/// reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Nutrient {
    /// Nitrogen
    #[serde(rename = "N")]
    Nitrogen,
    /// Phosphorus (elemental P)
    #[serde(rename = "P")]
    Phosphorus,
    /// Potassium (elemental K)
    #[serde(rename = "K")]
    Potassium,
    /// Sulfur
    #[serde(rename = "S")]
    Sulfur,
    /// Zinc (micronutrient)
    #[serde(rename = "Zn")]
    Zinc,
    /// Boron (micronutrient)
    #[serde(rename = "B")]
    Boron,
    /// Manganese (micronutrient)
    #[serde(rename = "Mn")]
    Manganese,
}

impl Nutrient {
    /// Every nutrient, in canonical order.
    pub const ALL: [Nutrient; 7] = [
        Nutrient::Nitrogen,
        Nutrient::Phosphorus,
        Nutrient::Potassium,
        Nutrient::Sulfur,
        Nutrient::Zinc,
        Nutrient::Boron,
        Nutrient::Manganese,
    ];

    /// Chemical symbol, also used as the serialized form.
    pub const fn symbol(self) -> &'static str {
        match self {
            Nutrient::Nitrogen => "N",
            Nutrient::Phosphorus => "P",
            Nutrient::Potassium => "K",
            Nutrient::Sulfur => "S",
            Nutrient::Zinc => "Zn",
            Nutrient::Boron => "B",
            Nutrient::Manganese => "Mn",
        }
    }

    pub const fn is_micronutrient(self) -> bool {
        matches!(self, Nutrient::Zinc | Nutrient::Boron | Nutrient::Manganese)
    }
}

impl std::fmt::Display for Nutrient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Nutrient {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Nutrient::ALL
            .iter()
            .copied()
            .find(|n| n.symbol().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown nutrient '{s}'"))
    }
}
