//! Shared data structures for fertilizer strategy optimization
//!
//! - `Nutrient`: closed nutrient enum with canonical ordering
//! - `Constraint`: budget / environmental / regulatory / preference bounds
//! - `OptimizationRequest`: one field + crop, fully resolved
//! - `AllocationResult`, `ScenarioDelta`: optimizer and analyzer outputs
//! - `StrategyRecord`, `ScenarioRecord`: what the strategy store persists

mod nutrient;
mod constraint;
mod request;
mod allocation;

pub use nutrient::*;
pub use constraint::*;
pub use request::*;
pub use allocation::*;
