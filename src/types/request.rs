//! Optimization request

use serde::{Deserialize, Serialize};

use super::{Constraint, Nutrient};

/// How much response-curve uncertainty the farmer is willing to bet on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskPreference {
    /// Plan against the pessimistic edge of the yield band
    Conservative,
    /// Plan against the central curve
    #[default]
    Neutral,
    /// Plan against the optimistic edge of the yield band
    Aggressive,
}

impl std::fmt::Display for RiskPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conservative => write!(f, "conservative"),
            Self::Neutral => write!(f, "neutral"),
            Self::Aggressive => write!(f, "aggressive"),
        }
    }
}

/// A fully resolved request for one field and crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub field_id: String,
    pub crop_id: String,
    /// Cap on predicted yield gain; allocation stops once it is reached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_yield_goal: Option<f64>,
    pub price_snapshot_id: String,
    /// Nutrients to plan; `None` plans every nutrient with a curve for the crop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrients: Option<Vec<Nutrient>>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub risk_preference: RiskPreference,
}

impl OptimizationRequest {
    pub fn new(
        field_id: impl Into<String>,
        crop_id: impl Into<String>,
        price_snapshot_id: impl Into<String>,
    ) -> Self {
        Self {
            field_id: field_id.into(),
            crop_id: crop_id.into(),
            target_yield_goal: None,
            price_snapshot_id: price_snapshot_id.into(),
            nutrients: None,
            constraints: Vec::new(),
            risk_preference: RiskPreference::Neutral,
        }
    }

    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    #[must_use]
    pub fn with_nutrients(mut self, nutrients: &[Nutrient]) -> Self {
        self.nutrients = Some(nutrients.to_vec());
        self
    }

    #[must_use]
    pub const fn with_risk(mut self, risk: RiskPreference) -> Self {
        self.risk_preference = risk;
        self
    }

    #[must_use]
    pub const fn with_yield_goal(mut self, goal: f64) -> Self {
        self.target_yield_goal = Some(goal);
        self
    }

    /// Same request priced against another snapshot.
    #[must_use]
    pub fn repriced(&self, snapshot_id: impl Into<String>) -> Self {
        Self {
            price_snapshot_id: snapshot_id.into(),
            ..self.clone()
        }
    }
}
