//! Fertilizer Strategy: Budget-Constrained Nutrient Allocation
//!
//! Turns crop response curves, a fertilizer/commodity price snapshot and a
//! set of constraints into a per-nutrient application plan with break-even,
//! sensitivity and confidence analysis.
//!
//! ## Architecture
//!
//! - **Response**: per-crop, per-nutrient Mitscherlich yield curves
//! - **Market**: immutable price snapshots behind a lock-free versioned cache
//! - **Constraints**: budget, environmental, regulatory and preference bounds
//!   merged into one feasible region
//! - **Optimization**: fixed-tick greedy allocation over marginal return per
//!   dollar, shaped by risk preference
//! - **Analysis**: break-even, price sweeps and Monte Carlo
//! - **Strategy**: the manager that runs, persists and re-checks plans

pub mod analysis;
pub mod config;
pub mod constraints;
pub mod error;
pub mod market;
pub mod optimization;
pub mod response;
pub mod scenario;
pub mod storage;
pub mod strategy;
pub mod types;

// Re-export configuration
pub use config::StrategyConfig;

// Re-export commonly used types
pub use types::{
    AllocationResult, BindingLimit, Constraint, ConstraintKind, ConstraintScope,
    EconomicSummary, Nutrient, NutrientAllocation, OptimizationRequest, OptimizerWarning,
    ReoptimizationAlert, RiskPreference, ScenarioDelta, ScenarioOutcome, StopReason, StrategyId,
    StrategyRecord,
};

// Re-export collaborators
pub use market::{PriceCache, PriceSnapshot};
pub use response::{CurveLibrary, CurveSource, NutrientResponseCurve};
pub use storage::{InMemoryStrategyStore, SledStrategyStore, StrategyStore};

// Re-export the manager
pub use error::StrategyError;
pub use strategy::{ManagerSettings, StrategyManager};
