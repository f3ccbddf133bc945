//! Response Curve Model
//!
//! Per-crop, per-nutrient diminishing-returns yield functions. Curves are
//! curated reference data: built once, validated, then shared read-only
//! across requests.

mod curve;
mod library;

pub use curve::{NutrientResponseCurve, UncertaintyBand, DOMAIN_TOLERANCE};
pub use library::{CurveLibrary, CurveSource};

use crate::types::Nutrient;
use thiserror::Error;

/// Response curve errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CurveError {
    #[error("rate {rate} kg/ha outside domain [0, {max_rate}] for {crop_id}/{nutrient}")]
    OutOfDomain {
        crop_id: String,
        nutrient: Nutrient,
        rate: f64,
        max_rate: f64,
    },

    #[error("no response curve for {crop_id}/{nutrient}")]
    NotFound { crop_id: String, nutrient: Nutrient },

    #[error("invalid response curve {crop_id}/{nutrient}: {reason}")]
    InvalidParameters {
        crop_id: String,
        nutrient: Nutrient,
        reason: String,
    },
}

/// Yield contribution of `curve` at `rate` kg/ha.
pub fn evaluate(curve: &NutrientResponseCurve, rate: f64) -> Result<f64, CurveError> {
    curve.evaluate(rate)
}

/// d(yield)/d(rate) of `curve` at `rate` kg/ha.
pub fn marginal(curve: &NutrientResponseCurve, rate: f64) -> Result<f64, CurveError> {
    curve.marginal(rate)
}
