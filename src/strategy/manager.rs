//! StrategyManager: compute, persist, compare, alert

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::{self, MonteCarloSummary, PriceShock};
use crate::config::MonteCarloConfig;
use crate::error::StrategyError;
use crate::market::{PriceCache, PriceSnapshot};
use crate::response::CurveSource;
use crate::storage::StrategyStore;
use crate::types::{
    AllocationResult, Nutrient, OptimizationRequest, ReoptimizationAlert, ScenarioDelta,
    ScenarioOutcome, ScenarioRecord, StrategyId, StrategyRecord, TrendPoint,
};

use super::{run_pipeline, validate_request, ManagerSettings};

/// Entry point for every strategy operation.
///
/// Shares read-only curves, the versioned price cache and the append-only
/// store. Computation is pure; only `optimize` and `scenario_delta` write.
pub struct StrategyManager {
    curves: Arc<dyn CurveSource>,
    prices: Arc<PriceCache>,
    store: Arc<dyn StrategyStore>,
    settings: ManagerSettings,
}

impl StrategyManager {
    pub fn new(
        curves: Arc<dyn CurveSource>,
        prices: Arc<PriceCache>,
        store: Arc<dyn StrategyStore>,
        settings: ManagerSettings,
    ) -> Self {
        info!(
            backend = store.backend_name(),
            snapshots = prices.len(),
            tick_kg_ha = settings.optimizer.tick_kg_ha,
            "Strategy manager ready"
        );
        Self {
            curves,
            prices,
            store,
            settings,
        }
    }

    pub const fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn prices(&self) -> &Arc<PriceCache> {
        &self.prices
    }

    pub fn store(&self) -> &Arc<dyn StrategyStore> {
        &self.store
    }

    /// Optimal allocation for `request`. Writes nothing.
    pub fn compute(&self, request: &OptimizationRequest) -> Result<AllocationResult, StrategyError> {
        self.compute_cancellable(request, None)
    }

    pub fn compute_cancellable(
        &self,
        request: &OptimizationRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<AllocationResult, StrategyError> {
        validate_request(request)?;
        let snapshot = self.prices.get(&request.price_snapshot_id)?;
        run_pipeline(self.curves.as_ref(), &snapshot, request, &self.settings, cancel)
    }

    /// Compute and persist. Nothing is stored when any stage fails.
    pub fn optimize(&self, request: &OptimizationRequest) -> Result<StrategyRecord, StrategyError> {
        self.optimize_cancellable(request, None)
    }

    pub fn optimize_cancellable(
        &self,
        request: &OptimizationRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<StrategyRecord, StrategyError> {
        let result = self.compute_cancellable(request, cancel)?;
        let record = StrategyRecord {
            strategy_id: StrategyId::new(),
            created_at: Utc::now(),
            request: request.clone(),
            result,
        };
        self.store.append_strategy(&record)?;

        info!(
            strategy_id = %record.strategy_id,
            field_id = %record.request.field_id,
            crop_id = %record.request.crop_id,
            snapshot_id = %record.result.snapshot_id,
            total_cost = record.result.total_cost(),
            net_return = record.result.economics.net_return,
            stop_reason = %record.result.stop_reason,
            "Strategy stored"
        );
        Ok(record)
    }

    pub fn get_strategy(&self, strategy_id: &StrategyId) -> Result<StrategyRecord, StrategyError> {
        self.store
            .get_strategy(strategy_id)?
            .ok_or_else(|| StrategyError::StrategyNotFound {
                strategy_id: strategy_id.to_string(),
            })
    }

    /// Reprice a stored plan under each snapshot, best ROI first.
    ///
    /// Every snapshot id must be published. A snapshot that lacks one of
    /// the plan's prices yields an outcome carrying the error.
    pub fn reprice(
        &self,
        strategy_id: &StrategyId,
        snapshot_ids: &[String],
    ) -> Result<Vec<ScenarioOutcome>, StrategyError> {
        let record = self.get_strategy(strategy_id)?;
        let mut snapshots = Vec::with_capacity(snapshot_ids.len());
        for id in snapshot_ids {
            snapshots.push(self.prices.get(id)?);
        }
        Ok(analysis::sweep(&record.result, &snapshots))
    }

    /// Reprice a stored plan under shocked copies of its own snapshot.
    pub fn shock_sweep(
        &self,
        strategy_id: &StrategyId,
        shocks: &[PriceShock],
    ) -> Result<Vec<ScenarioOutcome>, StrategyError> {
        let record = self.get_strategy(strategy_id)?;
        let base = self.prices.get(&record.result.snapshot_id)?;
        let shocked = analysis::price_shocks(&base, shocks);
        Ok(analysis::sweep(&record.result, &shocked))
    }

    /// Seeded Monte Carlo of a stored plan around its own snapshot.
    pub fn monte_carlo(
        &self,
        strategy_id: &StrategyId,
        config: &MonteCarloConfig,
    ) -> Result<MonteCarloSummary, StrategyError> {
        let record = self.get_strategy(strategy_id)?;
        let base = self.prices.get(&record.result.snapshot_id)?;
        Ok(analysis::monte_carlo(&record.result, &base, config)?)
    }

    /// Stored plan versus a fresh optimization under `alternate_snapshot_id`.
    ///
    /// The comparison is appended to the store.
    pub fn scenario_delta(
        &self,
        strategy_id: &StrategyId,
        alternate_snapshot_id: &str,
    ) -> Result<ScenarioDelta, StrategyError> {
        let record = self.get_strategy(strategy_id)?;
        let alternate = self.prices.get(alternate_snapshot_id)?;
        let delta = self.delta_for(&record, &alternate)?;

        self.store.append_scenario(&ScenarioRecord {
            strategy_id: record.strategy_id,
            created_at: Utc::now(),
            delta: delta.clone(),
        })?;
        debug!(
            strategy_id = %record.strategy_id,
            alternate_snapshot_id,
            roi_change = ?delta.roi_change,
            reoptimize = delta.reoptimize_recommended,
            "Scenario delta stored"
        );
        Ok(delta)
    }

    fn delta_for(
        &self,
        record: &StrategyRecord,
        alternate: &PriceSnapshot,
    ) -> Result<ScenarioDelta, StrategyError> {
        let repriced = analysis::reprice(&record.result, alternate)?;
        let request = record.request.repriced(alternate.snapshot_id.clone());
        let recomputed = run_pipeline(self.curves.as_ref(), alternate, &request, &self.settings, None)?;

        let before = &repriced.economics;
        let after = &recomputed.economics;
        let net_revenue_change = after.net_revenue_delta - before.net_revenue_delta;
        let net_return_change = after.net_return - before.net_return;
        let roi_change = match (after.roi_percent, before.roi_percent) {
            (Some(a), Some(b)) => Some(a - b),
            _ => None,
        };
        // ROI is undefined for a zero-cost plan; fall back to any gain in net return
        let reoptimize_recommended = match roi_change {
            Some(change) => change.abs() >= self.settings.materiality_threshold_pct,
            None => net_return_change > 0.0,
        };

        Ok(ScenarioDelta {
            strategy_id: record.strategy_id,
            base: record.result.clone(),
            alternate_snapshot_id: alternate.snapshot_id.clone(),
            net_revenue_change,
            net_return_change,
            roi_change,
            reoptimize_recommended,
            repriced,
            recomputed,
        })
    }

    /// Check the latest plan of every field and crop against a newly
    /// published snapshot.
    ///
    /// Plans whose inputs the snapshot does not fully price are skipped, as
    /// are deltas that fail to compute. A comparison that cannot be stored
    /// is logged and its alert still returned.
    pub fn on_snapshot_published(
        &self,
        snapshot_id: &str,
    ) -> Result<Vec<ReoptimizationAlert>, StrategyError> {
        let snapshot = self.prices.get(snapshot_id)?;
        let latest = self.store.latest_strategies()?;
        let mut alerts = Vec::new();

        for record in &latest {
            if record.result.snapshot_id == snapshot_id {
                continue;
            }
            let nutrients: Vec<Nutrient> = record.result.allocations.iter().map(|a| a.nutrient).collect();
            if !snapshot.prices_all(&record.request.crop_id, &nutrients) {
                debug!(
                    strategy_id = %record.strategy_id,
                    snapshot_id,
                    "Snapshot does not price every input, skipping"
                );
                continue;
            }

            let delta = match self.delta_for(record, &snapshot) {
                Ok(d) => d,
                Err(e) => {
                    warn!(
                        strategy_id = %record.strategy_id,
                        snapshot_id,
                        error = %e,
                        "Could not compare strategy against new prices"
                    );
                    continue;
                }
            };
            // A failed append loses the audit record, not the alert
            if let Err(e) = self.store.append_scenario(&ScenarioRecord {
                strategy_id: record.strategy_id,
                created_at: Utc::now(),
                delta: delta.clone(),
            }) {
                warn!(
                    strategy_id = %record.strategy_id,
                    snapshot_id,
                    error = %e,
                    "Could not store scenario comparison"
                );
            }

            if delta.reoptimize_recommended {
                info!(
                    strategy_id = %record.strategy_id,
                    field_id = %record.request.field_id,
                    crop_id = %record.request.crop_id,
                    snapshot_id,
                    roi_change = ?delta.roi_change,
                    net_return_change = delta.net_return_change,
                    "Re-optimization recommended"
                );
                alerts.push(ReoptimizationAlert {
                    strategy_id: record.strategy_id,
                    field_id: record.request.field_id.clone(),
                    crop_id: record.request.crop_id.clone(),
                    snapshot_id: snapshot_id.to_string(),
                    roi_change: delta.roi_change,
                    net_return_change: delta.net_return_change,
                });
            }
        }
        Ok(alerts)
    }

    /// Every stored strategy for a field, oldest first.
    pub fn history(&self, field_id: &str) -> Result<Vec<StrategyRecord>, StrategyError> {
        Ok(self.store.field_history(field_id)?)
    }

    /// Cost and return of a field's strategies for one crop over time.
    pub fn trend(&self, field_id: &str, crop_id: &str) -> Result<Vec<TrendPoint>, StrategyError> {
        Ok(self
            .store
            .field_history(field_id)?
            .into_iter()
            .filter(|r| r.request.crop_id == crop_id)
            .map(|r| TrendPoint {
                strategy_id: r.strategy_id,
                created_at: r.created_at,
                snapshot_id: r.result.snapshot_id.clone(),
                total_cost: r.result.total_cost(),
                net_return: r.result.economics.net_return,
                roi_percent: r.result.roi_percent(),
            })
            .collect())
    }

    pub fn scenarios(&self, strategy_id: &StrategyId) -> Result<Vec<ScenarioRecord>, StrategyError> {
        Ok(self.store.scenarios_for(strategy_id)?)
    }
}
