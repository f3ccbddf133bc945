//! Repricing a fixed allocation across price scenarios

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::market::{PriceError, PriceSnapshot};
use crate::types::{AllocationResult, ScenarioOutcome, ScenarioPerformance};

use super::summarize;

/// Economics of `result`'s rates under `snapshot`'s prices.
///
/// Yield is unchanged; only costs and revenue move. Every planned nutrient
/// and the crop must be priced in `snapshot`.
pub fn reprice(result: &AllocationResult, snapshot: &PriceSnapshot) -> Result<ScenarioPerformance, PriceError> {
    let mut total_cost = 0.0;
    let mut yield_delta = 0.0;
    for a in &result.allocations {
        total_cost += a.rate_kg_ha * snapshot.nutrient_unit_cost(a.nutrient)?;
        yield_delta += a.yield_delta;
    }
    let commodity_price = snapshot.commodity_price(&result.crop_id)?;

    Ok(ScenarioPerformance {
        snapshot_id: snapshot.snapshot_id.clone(),
        economics: summarize(total_cost, yield_delta, commodity_price),
    })
}

/// Reprice `result` under every snapshot in parallel.
///
/// Failures stay local to their snapshot. Outcomes come back best ROI
/// first, unpriceable and zero-cost outcomes last, ties by snapshot id.
pub fn sweep<S>(result: &AllocationResult, snapshots: &[S]) -> Vec<ScenarioOutcome>
where
    S: AsRef<PriceSnapshot> + Sync,
{
    let mut outcomes: Vec<ScenarioOutcome> = snapshots
        .par_iter()
        .map(|s| {
            let snapshot = s.as_ref();
            match reprice(result, snapshot) {
                Ok(performance) => ScenarioOutcome {
                    snapshot_id: snapshot.snapshot_id.clone(),
                    performance: Some(performance),
                    error: None,
                },
                Err(e) => ScenarioOutcome {
                    snapshot_id: snapshot.snapshot_id.clone(),
                    performance: None,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    outcomes.sort_by(|a, b| match (a.roi_percent(), b.roi_percent()) {
        (Some(x), Some(y)) => y.total_cmp(&x).then_with(|| a.snapshot_id.cmp(&b.snapshot_id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.snapshot_id.cmp(&b.snapshot_id),
    });
    outcomes
}

/// Percentage moves applied to a base snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceShock {
    pub commodity_pct: f64,
    pub fertilizer_pct: f64,
}

impl PriceShock {
    pub const fn new(commodity_pct: f64, fertilizer_pct: f64) -> Self {
        Self {
            commodity_pct,
            fertilizer_pct,
        }
    }

    /// Commodity and fertilizer moves of 10% and 20% in each direction,
    /// one side at a time.
    pub fn standard_grid() -> Vec<Self> {
        let steps = [-20.0, -10.0, 10.0, 20.0];
        steps
            .iter()
            .map(|&c| Self::new(c, 0.0))
            .chain(steps.iter().map(|&f| Self::new(0.0, f)))
            .collect()
    }

    fn label(&self) -> String {
        format!("c{:+}%/f{:+}%", self.commodity_pct, self.fertilizer_pct)
    }
}

/// Derived snapshots, one per shock, with ids `<base>@<shock>`.
///
/// A shock of -100% or below would zero a price, so it is skipped.
pub fn price_shocks(base: &PriceSnapshot, shocks: &[PriceShock]) -> Vec<PriceSnapshot> {
    shocks
        .iter()
        .filter(|s| s.commodity_pct > -100.0 && s.fertilizer_pct > -100.0)
        .map(|s| {
            base.scaled(
                format!("{}@{}", base.snapshot_id, s.label()),
                1.0 + s.commodity_pct / 100.0,
                1.0 + s.fertilizer_pct / 100.0,
            )
        })
        .collect()
}
