//! Scenario files: curves, snapshots and one request in a single TOML file
//!
//! ```toml
//! compare = ["spring-2026"]
//!
//! [request]
//! field_id = "north-40"
//! crop_id = "corn"
//! price_snapshot_id = "winter-2026"
//! constraints = [{ id = "budget", kind = "budget", scope = "farm", max = 100.0 }]
//!
//! [[curves]]
//! crop_id = "corn"
//! nutrient = "N"
//! y_max = 60.0
//! k = 0.02
//! max_rate = 250.0
//!
//! [[snapshots]]
//! snapshot_id = "winter-2026"
//! timestamp = "2026-01-15T00:00:00Z"
//! currency = "USD"
//! fertilizers = [{ product = "urea", nutrient = "N", nutrient_fraction = 0.46, price_per_kg = 0.46 }]
//! commodities = [{ crop_id = "corn", price_per_unit = 5.0 }]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::market::{PriceCache, PriceError, PriceSnapshot};
use crate::response::CurveLibrary;
use crate::storage::StrategyStore;
use crate::strategy::{ManagerSettings, StrategyManager};
use crate::types::OptimizationRequest;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario file ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse scenario file ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error(transparent)]
    Price(#[from] PriceError),
}

/// Everything one CLI run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioFile {
    pub request: OptimizationRequest,
    /// Alternate snapshot ids to compare the stored plan against
    #[serde(default)]
    pub compare: Vec<String>,
    pub curves: CurveLibrary,
    pub snapshots: Vec<PriceSnapshot>,
}

impl ScenarioFile {
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ScenarioError::Io(path.to_path_buf(), e))?;
        let scenario: Self =
            toml::from_str(&content).map_err(|e| ScenarioError::Parse(path.to_path_buf(), e))?;
        info!(
            path = %path.display(),
            curves = scenario.curves.len(),
            snapshots = scenario.snapshots.len(),
            "Scenario loaded"
        );
        Ok(scenario)
    }

    /// Publish the snapshots in file order and wire a manager around them.
    pub fn into_manager(
        self,
        store: Arc<dyn StrategyStore>,
        settings: ManagerSettings,
    ) -> Result<(StrategyManager, OptimizationRequest, Vec<String>), ScenarioError> {
        let prices = PriceCache::with_snapshots(self.snapshots)?;
        let manager = StrategyManager::new(Arc::new(self.curves), Arc::new(prices), store, settings);
        Ok((manager, self.request, self.compare))
    }
}
