//! Strategy Manager
//!
//! Orchestrates a request through the pipeline, persists outcomes, compares
//! stored plans against new prices, and raises re-optimization alerts when
//! a published snapshot makes a stored plan materially worse.

mod manager;
mod pipeline;
mod watcher;

pub use manager::StrategyManager;
pub use pipeline::{run_pipeline, validate_request};
pub use watcher::run_reoptimization_watcher;

use crate::config::{self, OptimizerConfig, RiskConfig, StrategyConfig};

/// Tunables the manager passes down to every run.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSettings {
    pub optimizer: OptimizerConfig,
    pub risk: RiskConfig,
    /// ROI change (percentage points) that flags a scenario delta
    pub materiality_threshold_pct: f64,
}

impl ManagerSettings {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            optimizer: config.optimizer.clone(),
            risk: config.risk.clone(),
            materiality_threshold_pct: config.manager.materiality_threshold_pct,
        }
    }

    /// Settings from the global config, or defaults when it was never
    /// initialized.
    pub fn current() -> Self {
        Self::from_config(config::get())
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&StrategyConfig::default())
    }
}
