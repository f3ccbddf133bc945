//! Confidence band from response-curve uncertainty

use statrs::distribution::{ContinuousCDF, Normal};

use crate::types::ConfidenceInterval;

use super::OptimizerError;

/// Two-sided standard normal quantile for `level` coverage (0.90 -> 1.645).
pub fn z_for_level(level: f64) -> Result<f64, OptimizerError> {
    if !(level > 0.0 && level < 1.0) {
        return Err(OptimizerError::InvalidSettings(format!(
            "confidence level must be in (0, 1), got {level}"
        )));
    }
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| OptimizerError::InvalidSettings(format!("standard normal: {e}")))?;
    Ok(normal.inverse_cdf(0.5 + level / 2.0))
}

/// One nutrient's yield and the coefficient of variation of its curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YieldContribution {
    pub yield_delta: f64,
    pub relative_std_dev: f64,
}

/// Band around the predicted yield and net return.
///
/// Nutrient contributions are treated as independent, so standard deviations
/// add in quadrature. Both bands are clamped at zero on the low side for
/// yield; net return may go negative.
pub fn confidence_interval(
    level: f64,
    z: f64,
    contributions: &[YieldContribution],
    commodity_price: f64,
    total_cost: f64,
) -> ConfidenceInterval {
    let total: f64 = contributions.iter().map(|c| c.yield_delta).sum();
    let variance: f64 = contributions
        .iter()
        .map(|c| (c.relative_std_dev * c.yield_delta).powi(2))
        .sum();
    let half_width = z * variance.sqrt();

    let low = (total - half_width).max(0.0);
    let high = total + half_width;

    ConfidenceInterval {
        level,
        yield_delta_low: low,
        yield_delta_high: high,
        net_return_low: low * commodity_price - total_cost,
        net_return_high: high * commodity_price - total_cost,
    }
}
