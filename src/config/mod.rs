//! Strategy Configuration Module
//!
//! Optimizer, risk, persistence and Monte Carlo tuning loaded from TOML, so
//! tick size, hurdles and thresholds are operator-tunable rather than
//! hardcoded.
//!
//! ## Loading Order
//!
//! 1. `FERTILIZER_STRATEGY_CONFIG` environment variable (path to TOML file)
//! 2. `strategy_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! config::init(StrategyConfig::load());
//!
//! // Anywhere in the codebase:
//! let tick = config::get().optimizer.tick_kg_ha;
//! ```

mod strategy_config;
pub mod validation;

pub use strategy_config::*;

use std::sync::OnceLock;

/// Global strategy configuration, initialized once at startup.
static STRATEGY_CONFIG: OnceLock<StrategyConfig> = OnceLock::new();

/// Fallback served by `get()` before `init()`.
static DEFAULT_CONFIG: OnceLock<StrategyConfig> = OnceLock::new();

/// Initialize the global strategy configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: StrategyConfig) {
    if STRATEGY_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Global strategy configuration, or the built-in defaults if `init()` has
/// not been called.
pub fn get() -> &'static StrategyConfig {
    STRATEGY_CONFIG
        .get()
        .unwrap_or_else(|| DEFAULT_CONFIG.get_or_init(StrategyConfig::default))
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    STRATEGY_CONFIG.get().is_some()
}
