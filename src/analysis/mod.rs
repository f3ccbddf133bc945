//! Break-Even & Sensitivity Analyzer
//!
//! Economics of an allocation under one snapshot, repricing of a stored
//! plan under other snapshots, and a seeded Monte Carlo view of price risk.

mod break_even;
mod monte_carlo;
mod sensitivity;

pub use break_even::summarize;
pub use monte_carlo::{monte_carlo, MonteCarloSummary};
pub use sensitivity::{price_shocks, reprice, sweep, PriceShock};

use thiserror::Error;

use crate::market::PriceError;

/// Analyzer errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error(transparent)]
    Price(#[from] PriceError),

    #[error("invalid Monte Carlo settings: {0}")]
    InvalidSettings(String),
}
