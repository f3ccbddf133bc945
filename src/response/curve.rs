//! Mitscherlich nutrient response curve

use serde::{Deserialize, Serialize};

use crate::types::Nutrient;

use super::CurveError;

/// Slack allowed past the domain edges to absorb tick arithmetic.
pub const DOMAIN_TOLERANCE: f64 = 1e-9;

/// Uncertainty of a curve's plateau, as a coefficient of variation of `y_max`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UncertaintyBand {
    pub relative_std_dev: f64,
}

impl UncertaintyBand {
    pub const fn new(relative_std_dev: f64) -> Self {
        Self { relative_std_dev }
    }

    /// Plateau multiplier at the pessimistic edge for a normal quantile `z`.
    pub fn lower_factor(&self, z: f64) -> f64 {
        (1.0 - z * self.relative_std_dev).max(0.0)
    }

    /// Plateau multiplier at the optimistic edge for a normal quantile `z`.
    pub fn upper_factor(&self, z: f64) -> f64 {
        1.0 + z * self.relative_std_dev
    }
}

/// Yield response of one crop to one nutrient:
/// `yield = y_max * (1 - exp(-k * rate))` on `[0, max_rate]`.
///
/// Concave and non-decreasing with strictly decreasing marginal return,
/// which the greedy allocator depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientResponseCurve {
    pub crop_id: String,
    pub nutrient: Nutrient,
    /// Plateau yield gain (commodity units/ha)
    pub y_max: f64,
    /// Curvature (1/(kg/ha))
    pub k: f64,
    /// Agronomic maximum rate (kg/ha); the upper edge of the domain
    pub max_rate: f64,
    #[serde(default)]
    pub uncertainty: UncertaintyBand,
}

impl NutrientResponseCurve {
    /// Build and validate a curve.
    pub fn mitscherlich(
        crop_id: impl Into<String>,
        nutrient: Nutrient,
        y_max: f64,
        k: f64,
        max_rate: f64,
    ) -> Result<Self, CurveError> {
        let curve = Self {
            crop_id: crop_id.into(),
            nutrient,
            y_max,
            k,
            max_rate,
            uncertainty: UncertaintyBand::default(),
        };
        curve.validate()?;
        Ok(curve)
    }

    /// Attach an uncertainty band.
    pub fn with_uncertainty(mut self, relative_std_dev: f64) -> Result<Self, CurveError> {
        self.uncertainty = UncertaintyBand::new(relative_std_dev);
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), CurveError> {
        let invalid = |reason: String| CurveError::InvalidParameters {
            crop_id: self.crop_id.clone(),
            nutrient: self.nutrient,
            reason,
        };
        if self.crop_id.trim().is_empty() {
            return Err(invalid("crop_id is empty".to_string()));
        }
        if !self.y_max.is_finite() || self.y_max <= 0.0 {
            return Err(invalid(format!("y_max must be > 0, got {}", self.y_max)));
        }
        if !self.k.is_finite() || self.k <= 0.0 {
            return Err(invalid(format!("k must be > 0, got {}", self.k)));
        }
        if !self.max_rate.is_finite() || self.max_rate <= 0.0 {
            return Err(invalid(format!("max_rate must be > 0, got {}", self.max_rate)));
        }
        let cv = self.uncertainty.relative_std_dev;
        if !cv.is_finite() || cv < 0.0 {
            return Err(invalid(format!("relative_std_dev must be >= 0, got {cv}")));
        }
        Ok(())
    }

    fn check_domain(&self, rate: f64) -> Result<(), CurveError> {
        if rate.is_nan() || rate < -DOMAIN_TOLERANCE || rate > self.max_rate + DOMAIN_TOLERANCE {
            return Err(CurveError::OutOfDomain {
                crop_id: self.crop_id.clone(),
                nutrient: self.nutrient,
                rate,
                max_rate: self.max_rate,
            });
        }
        Ok(())
    }

    /// Yield contribution at `rate` kg/ha.
    pub fn evaluate(&self, rate: f64) -> Result<f64, CurveError> {
        self.check_domain(rate)?;
        let rate = rate.clamp(0.0, self.max_rate);
        Ok(self.y_max * (1.0 - (-self.k * rate).exp()))
    }

    /// Derivative of yield with respect to rate at `rate` kg/ha.
    pub fn marginal(&self, rate: f64) -> Result<f64, CurveError> {
        self.check_domain(rate)?;
        let rate = rate.clamp(0.0, self.max_rate);
        Ok(self.y_max * self.k * (-self.k * rate).exp())
    }

    /// Yield at the agronomic maximum.
    pub fn plateau(&self) -> f64 {
        self.y_max * (1.0 - (-self.k * self.max_rate).exp())
    }

    /// Same curve with the plateau scaled by `factor`.
    #[must_use]
    pub fn with_yield_scale(&self, factor: f64) -> Self {
        Self {
            y_max: self.y_max * factor.max(0.0),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corn_n() -> NutrientResponseCurve {
        NutrientResponseCurve::mitscherlich("corn", Nutrient::Nitrogen, 60.0, 0.02, 250.0).unwrap()
    }

    #[test]
    fn evaluate_is_zero_at_zero_and_saturates() {
        let c = corn_n();
        assert_eq!(c.evaluate(0.0).unwrap(), 0.0);
        let at_max = c.evaluate(250.0).unwrap();
        assert!(at_max < 60.0);
        assert!((at_max - c.plateau()).abs() < 1e-12);
        assert!(at_max > 59.0, "should be near plateau, got {at_max}");
    }

    #[test]
    fn marginal_is_strictly_decreasing() {
        let c = corn_n();
        let mut prev = c.marginal(0.0).unwrap();
        assert!((prev - 1.2).abs() < 1e-12);
        for step in 1..=250 {
            let m = c.marginal(f64::from(step)).unwrap();
            assert!(m < prev, "marginal must decrease at rate {step}");
            prev = m;
        }
    }

    #[test]
    fn marginal_matches_finite_difference() {
        let c = corn_n();
        let h = 1e-6;
        let fd = (c.evaluate(50.0 + h).unwrap() - c.evaluate(50.0 - h).unwrap()) / (2.0 * h);
        assert!((fd - c.marginal(50.0).unwrap()).abs() < 1e-6);
    }

    #[test]
    fn out_of_domain_rates_fail() {
        let c = corn_n();
        assert!(matches!(
            c.evaluate(250.1),
            Err(CurveError::OutOfDomain { nutrient: Nutrient::Nitrogen, .. })
        ));
        assert!(c.marginal(-1.0).is_err());
        assert!(c.evaluate(f64::NAN).is_err());
        // Tick arithmetic noise at the edge is tolerated
        assert!(c.evaluate(250.0 + 1e-12).is_ok());
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(NutrientResponseCurve::mitscherlich("corn", Nutrient::Nitrogen, 0.0, 0.02, 200.0).is_err());
        assert!(NutrientResponseCurve::mitscherlich("corn", Nutrient::Nitrogen, 60.0, -0.1, 200.0).is_err());
        assert!(NutrientResponseCurve::mitscherlich("corn", Nutrient::Nitrogen, 60.0, 0.02, 0.0).is_err());
        assert!(NutrientResponseCurve::mitscherlich("", Nutrient::Nitrogen, 60.0, 0.02, 200.0).is_err());
        assert!(corn_n().with_uncertainty(-0.1).is_err());
    }

    #[test]
    fn yield_scale_preserves_curvature() {
        let c = corn_n().with_uncertainty(0.1).unwrap();
        let low = c.with_yield_scale(c.uncertainty.lower_factor(1.645));
        let ratio = low.evaluate(80.0).unwrap() / c.evaluate(80.0).unwrap();
        assert!((ratio - (1.0 - 0.1645)).abs() < 1e-9);
        assert_eq!(low.k, c.k);
    }

    #[test]
    fn band_factors_clamp_at_zero() {
        let band = UncertaintyBand::new(0.8);
        assert_eq!(band.lower_factor(2.0), 0.0);
        assert!((band.upper_factor(2.0) - 2.6).abs() < 1e-12);
    }
}
