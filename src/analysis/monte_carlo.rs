//! Seeded Monte Carlo over commodity and fertilizer price moves

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, LogNormal};
use serde::{Deserialize, Serialize};

use crate::config::MonteCarloConfig;
use crate::market::PriceSnapshot;
use crate::types::AllocationResult;

use super::{reprice, AnalysisError};

/// Distribution of a plan's outcome under random price moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    pub snapshot_id: String,
    pub samples: usize,
    pub seed: u64,
    pub net_return_p10: f64,
    pub net_return_p50: f64,
    pub net_return_p90: f64,
    /// `None` for a zero-cost plan
    pub roi_p10: Option<f64>,
    pub roi_p50: Option<f64>,
    pub roi_p90: Option<f64>,
    /// Share of samples with negative net return
    pub probability_of_loss: f64,
}

/// Mean-one log-normal multiplier with log-space standard deviation `sigma`.
fn multiplier(sigma: f64, name: &str) -> Result<LogNormal<f64>, AnalysisError> {
    LogNormal::new(-sigma * sigma / 2.0, sigma)
        .map_err(|e| AnalysisError::InvalidSettings(format!("{name} volatility {sigma}: {e}")))
}

/// Nearest-rank percentile of sorted `values`.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let idx = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Simulate `result` under random commodity and fertilizer price moves
/// around `snapshot`.
///
/// One commodity multiplier and one fertilizer multiplier are drawn per
/// sample; all fertilizers move together. Identical settings give identical
/// summaries.
pub fn monte_carlo(
    result: &AllocationResult,
    snapshot: &PriceSnapshot,
    config: &MonteCarloConfig,
) -> Result<MonteCarloSummary, AnalysisError> {
    if config.samples == 0 {
        return Err(AnalysisError::InvalidSettings("samples must be > 0".to_string()));
    }
    let commodity = multiplier(config.commodity_volatility, "commodity")?;
    let fertilizer = multiplier(config.fertilizer_volatility, "fertilizer")?;

    let base = reprice(result, snapshot)?.economics;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut net_returns = Vec::with_capacity(config.samples);
    let mut rois = Vec::with_capacity(config.samples);
    for _ in 0..config.samples {
        let c = commodity.sample(&mut rng);
        let f = fertilizer.sample(&mut rng);
        let cost = base.total_cost * f;
        let net = base.net_revenue_delta * c - cost;
        net_returns.push(net);
        if cost > 0.0 {
            rois.push(net / cost * 100.0);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let probability_of_loss =
        net_returns.iter().filter(|n| **n < 0.0).count() as f64 / config.samples as f64;

    net_returns.sort_by(f64::total_cmp);
    rois.sort_by(f64::total_cmp);
    let roi_at = |p: f64| (!rois.is_empty()).then(|| percentile(&rois, p));

    Ok(MonteCarloSummary {
        snapshot_id: snapshot.snapshot_id.clone(),
        samples: config.samples,
        seed: config.seed,
        net_return_p10: percentile(&net_returns, 0.10),
        net_return_p50: percentile(&net_returns, 0.50),
        net_return_p90: percentile(&net_returns, 0.90),
        roi_p10: roi_at(0.10),
        roi_p50: roi_at(0.50),
        roi_p90: roi_at(0.90),
        probability_of_loss,
    })
}
