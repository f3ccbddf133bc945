//! Economic Optimizer
//!
//! Allocates nutrient rates to maximize net return inside a feasible region
//! with a fixed-tick, marginal-value-per-dollar greedy. Pure and synchronous:
//! every curve, bound and price is resolved before it starts.

mod confidence;
mod optimizer;
mod risk;

pub use confidence::{confidence_interval, z_for_level, YieldContribution};
pub use optimizer::{AllocationOptimizer, NutrientCandidate, NutrientOutcome, OptimizationProblem, OptimizerOutcome};
pub use risk::RiskProfile;

use thiserror::Error;

use crate::response::CurveError;

/// Optimizer errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    #[error("optimization cancelled after {ticks_completed} ticks")]
    Cancelled { ticks_completed: usize },

    #[error("invalid optimizer settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Curve(#[from] CurveError),
}
