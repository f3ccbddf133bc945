//! Strategy configuration loaded from TOML

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "FERTILIZER_STRATEGY_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "strategy_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for the optimization engine.
///
/// Load with `StrategyConfig::load()` which searches:
/// 1. `$FERTILIZER_STRATEGY_CONFIG` env var
/// 2. `./strategy_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Greedy allocator tuning
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Risk-preference mapping
    #[serde(default)]
    pub risk: RiskConfig,

    /// Strategy manager behavior
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Strategy persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Monte Carlo price-risk sampling
    #[serde(default)]
    pub monte_carlo: MonteCarloConfig,
}

impl StrategyConfig {
    /// Load configuration using the standard search order:
    /// 1. `$FERTILIZER_STRATEGY_CONFIG` environment variable
    /// 2. `./strategy_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded strategy config from {CONFIG_ENV_VAR}");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV_VAR}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV_VAR} points to non-existent file, falling back");
            }
        }

        // 2. Check ./strategy_config.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded strategy config from ./{LOCAL_CONFIG_FILE}");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No strategy config found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are logged as warnings; bad values fail validation.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate value ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (mut errors, range_warnings) = super::validation::validate_physical_ranges(self);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if self.storage.backend == StorageBackend::Sled
            && self.storage.path.as_os_str().is_empty()
        {
            errors.push("storage.path must be set for the sled backend".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

/// Greedy allocator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Rate increment per greedy step (kg/ha)
    pub tick_kg_ha: f64,
    /// Score tolerance when comparing against the hurdle
    pub epsilon: f64,
    /// Hard cap on greedy steps
    pub max_iterations: usize,
    /// Minimum return per dollar for a tick (1.0 = break even at the margin)
    pub hurdle_rate: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            tick_kg_ha: 0.1,
            epsilon: 1e-6,
            max_iterations: 200_000,
            hurdle_rate: 1.0,
        }
    }
}

/// How risk preferences shape the decision curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Two-sided coverage of the uncertainty band and confidence interval
    pub confidence_level: f64,
    /// Share of the feasible rate window a conservative plan may use
    pub conservative_rate_fraction: f64,
    /// Return per dollar a conservative plan demands
    pub conservative_hurdle: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            confidence_level: 0.90,
            conservative_rate_fraction: 0.85,
            conservative_hurdle: 1.10,
        }
    }
}

/// Strategy manager behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// ROI change (percentage points) that makes a scenario delta material
    pub materiality_threshold_pct: f64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            materiality_threshold_pct: 5.0,
        }
    }
}

/// Strategy store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database directory for the sled backend
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("./data/strategies"),
        }
    }
}

/// Monte Carlo price-risk sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub samples: usize,
    /// Log-space standard deviation of the commodity price multiplier
    pub commodity_volatility: f64,
    /// Log-space standard deviation of the fertilizer price multiplier
    pub fertilizer_volatility: f64,
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            samples: 1000,
            commodity_volatility: 0.15,
            fertilizer_volatility: 0.20,
            seed: 42,
        }
    }
}
