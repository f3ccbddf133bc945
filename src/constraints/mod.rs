//! Constraint Resolver
//!
//! Merges budget ceilings, environmental / regulatory rate limits, and user
//! preferences into a feasible region. Environmental and regulatory bounds
//! always win over preferences; a preference that conflicts with them is
//! clamped and reported, never applied.

mod resolver;

pub use resolver::resolve;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{BoundSource, Nutrient, PreferenceOverride};

/// Constraint resolution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstraintError {
    #[error("constraint '{constraint_id}' rejected: {reason}")]
    Invalid { constraint_id: String, reason: String },

    #[error("infeasible constraints: {detail} [{}]", .constraint_ids.join(", "))]
    Infeasible {
        /// Nutrient whose window is empty; `None` for budget conflicts
        nutrient: Option<Nutrient>,
        constraint_ids: Vec<String>,
        detail: String,
    },
}

/// Resolved rate window for one nutrient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientBounds {
    pub min: f64,
    pub max: f64,
    pub min_source: BoundSource,
    pub max_source: BoundSource,
    /// Per-nutrient spend cap from a nutrient-scoped budget constraint
    pub spend_cap: Option<f64>,
    pub spend_cap_source: Option<String>,
}

impl NutrientBounds {
    /// Unconstrained window over a curve's agronomic domain.
    pub const fn agronomic(max_rate: f64) -> Self {
        Self {
            min: 0.0,
            max: max_rate,
            min_source: BoundSource::Floor,
            max_source: BoundSource::AgronomicMax,
            spend_cap: None,
            spend_cap_source: None,
        }
    }

    pub fn contains(&self, rate: f64) -> bool {
        rate >= self.min && rate <= self.max
    }
}

/// Rates and spend that satisfy every active constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibleRegion {
    pub bounds: BTreeMap<Nutrient, NutrientBounds>,
    /// Ceiling on total spend across nutrients; `None` when unconstrained
    pub budget_ceiling: Option<f64>,
    /// Constraint that set the ceiling
    pub budget_sources: Vec<String>,
    /// Preferences clamped to authoritative bounds
    pub overrides: Vec<PreferenceOverride>,
}

impl FeasibleRegion {
    pub fn bounds(&self, nutrient: Nutrient) -> Option<&NutrientBounds> {
        self.bounds.get(&nutrient)
    }

    pub fn nutrients(&self) -> Vec<Nutrient> {
        self.bounds.keys().copied().collect()
    }

    /// Fail if the mandatory minimum rates already cost more than a budget
    /// allows.
    ///
    /// Needs unit costs, so it runs once prices are resolved.
    pub fn check_minimum_spend(&self, unit_costs: &BTreeMap<Nutrient, f64>) -> Result<(), ConstraintError> {
        let mut minimum_spend = 0.0;
        for (nutrient, b) in &self.bounds {
            let cost = unit_costs.get(nutrient).copied().unwrap_or(0.0);
            let spend = b.min * cost;
            if let (Some(cap), Some(cap_id)) = (b.spend_cap, b.spend_cap_source.as_ref()) {
                if spend > cap {
                    let mut ids = vec![cap_id.clone()];
                    ids.extend(b.min_source.constraint_id().map(str::to_string));
                    return Err(ConstraintError::Infeasible {
                        nutrient: Some(*nutrient),
                        constraint_ids: ids,
                        detail: format!(
                            "minimum {nutrient} rate {:.1} kg/ha costs {spend:.2}, above spend cap {cap:.2}",
                            b.min
                        ),
                    });
                }
            }
            minimum_spend += spend;
        }

        if let Some(ceiling) = self.budget_ceiling {
            if minimum_spend > ceiling {
                let mut ids = self.budget_sources.clone();
                ids.extend(
                    self.bounds
                        .values()
                        .filter_map(|b| b.min_source.constraint_id().map(str::to_string)),
                );
                return Err(ConstraintError::Infeasible {
                    nutrient: None,
                    constraint_ids: ids,
                    detail: format!(
                        "minimum rates cost {minimum_spend:.2}, above budget ceiling {ceiling:.2}"
                    ),
                });
            }
        }
        Ok(())
    }
}
