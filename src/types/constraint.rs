//! Constraint records supplied with an optimization request

use serde::{Deserialize, Serialize};

use super::Nutrient;

/// Closed set of constraint types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Spend ceiling (currency per hectare)
    Budget,
    /// Environmental maximum application rate (kg/ha)
    EnvironmentalMaxRate,
    /// Regulatory rate limit (kg/ha)
    Regulatory,
    /// Farmer preference (kg/ha)
    UserPreference,
}

impl ConstraintKind {
    /// Environmental and regulatory bounds outrank user preferences.
    pub const fn is_authoritative(self) -> bool {
        matches!(self, Self::EnvironmentalMaxRate | Self::Regulatory)
    }

    pub const fn is_rate_bound(self) -> bool {
        !matches!(self, Self::Budget)
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Budget => write!(f, "budget"),
            Self::EnvironmentalMaxRate => write!(f, "environmental_max_rate"),
            Self::Regulatory => write!(f, "regulatory"),
            Self::UserPreference => write!(f, "user_preference"),
        }
    }
}

/// What a constraint applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintScope {
    /// A single nutrient
    Nutrient(Nutrient),
    /// A single field; ignored for requests on other fields
    Field(String),
    /// Every field of the farm
    Farm,
}

/// A single bound on the allocation.
///
/// Rate constraints bound kg/ha; budget constraints bound spend and only
/// accept `max`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: String,
    pub kind: ConstraintKind,
    pub scope: ConstraintScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl Constraint {
    /// Farm-wide spend ceiling.
    pub fn budget(id: impl Into<String>, ceiling: f64) -> Self {
        Self {
            id: id.into(),
            kind: ConstraintKind::Budget,
            scope: ConstraintScope::Farm,
            min: None,
            max: Some(ceiling),
        }
    }

    /// Spend cap on one nutrient.
    pub fn nutrient_budget(id: impl Into<String>, nutrient: Nutrient, cap: f64) -> Self {
        Self {
            id: id.into(),
            kind: ConstraintKind::Budget,
            scope: ConstraintScope::Nutrient(nutrient),
            min: None,
            max: Some(cap),
        }
    }

    /// Maximum application rate on one nutrient.
    pub fn max_rate(
        id: impl Into<String>,
        kind: ConstraintKind,
        nutrient: Nutrient,
        max: f64,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            scope: ConstraintScope::Nutrient(nutrient),
            min: None,
            max: Some(max),
        }
    }

    /// Rate window on one nutrient.
    pub fn rate_range(
        id: impl Into<String>,
        kind: ConstraintKind,
        nutrient: Nutrient,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            scope: ConstraintScope::Nutrient(nutrient),
            min,
            max,
        }
    }

    /// Whether this constraint is in force for `field_id`.
    pub fn applies_to_field(&self, field_id: &str) -> bool {
        match &self.scope {
            ConstraintScope::Field(f) => f == field_id,
            ConstraintScope::Nutrient(_) | ConstraintScope::Farm => true,
        }
    }

    /// Whether this rate constraint bounds `nutrient`.
    pub fn bounds_nutrient(&self, nutrient: Nutrient) -> bool {
        match &self.scope {
            ConstraintScope::Nutrient(n) => *n == nutrient,
            ConstraintScope::Field(_) | ConstraintScope::Farm => true,
        }
    }
}
