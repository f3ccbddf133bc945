//! Top-level error for strategy operations

use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::constraints::ConstraintError;
use crate::market::PriceError;
use crate::optimization::OptimizerError;
use crate::response::CurveError;
use crate::storage::PersistenceError;

/// Any failure of a strategy manager operation.
///
/// Every variant carries the id of the offending entity.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("invalid request: {field}: {reason}")]
    InvalidRequest { field: String, reason: String },

    #[error("strategy {strategy_id} not found")]
    StrategyNotFound { strategy_id: String },

    #[error(transparent)]
    Curve(#[from] CurveError),

    #[error(transparent)]
    Price(#[from] PriceError),

    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl StrategyError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// True for a cancelled optimization.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Optimizer(OptimizerError::Cancelled { .. }))
    }
}
