//! Risk preference mapping
//!
//! | preference   | decision curve y_max      | rate window             | hurdle                 |
//! |--------------|---------------------------|-------------------------|------------------------|
//! | conservative | `y_max * max(0, 1 - z*cv)`| `min + (max-min)*frac`  | `max(base, cons)`      |
//! | neutral      | central                   | unchanged               | base                   |
//! | aggressive   | `y_max * (1 + z*cv)`      | unchanged               | base                   |
//!
//! Only the allocation decision is shifted. Reported yield and economics use
//! the central curve.

use crate::config::RiskConfig;
use crate::constraints::NutrientBounds;
use crate::response::NutrientResponseCurve;
use crate::types::{BoundSource, RiskPreference};

use super::{z_for_level, OptimizerError};

#[derive(Debug, Clone, PartialEq)]
pub struct RiskProfile {
    pub preference: RiskPreference,
    /// Normal quantile of the configured confidence level
    pub z: f64,
    pub rate_fraction: f64,
    pub hurdle: f64,
}

impl RiskProfile {
    pub fn new(
        preference: RiskPreference,
        config: &RiskConfig,
        base_hurdle: f64,
    ) -> Result<Self, OptimizerError> {
        let z = z_for_level(config.confidence_level)?;
        let (rate_fraction, hurdle) = match preference {
            RiskPreference::Conservative => (
                config.conservative_rate_fraction.clamp(0.0, 1.0),
                base_hurdle.max(config.conservative_hurdle),
            ),
            RiskPreference::Neutral | RiskPreference::Aggressive => (1.0, base_hurdle),
        };
        Ok(Self {
            preference,
            z,
            rate_fraction,
            hurdle,
        })
    }

    /// Curve the allocator ranks ticks on.
    pub fn decision_curve(&self, curve: &NutrientResponseCurve) -> NutrientResponseCurve {
        match self.preference {
            RiskPreference::Conservative => {
                curve.with_yield_scale(curve.uncertainty.lower_factor(self.z))
            }
            RiskPreference::Neutral => curve.clone(),
            RiskPreference::Aggressive => {
                curve.with_yield_scale(curve.uncertainty.upper_factor(self.z))
            }
        }
    }

    /// Shrink the upper rate bound toward the minimum.
    pub fn narrow(&self, bounds: &NutrientBounds) -> NutrientBounds {
        if self.rate_fraction >= 1.0 {
            return bounds.clone();
        }
        let narrowed = bounds.min + (bounds.max - bounds.min) * self.rate_fraction;
        if narrowed >= bounds.max {
            return bounds.clone();
        }
        NutrientBounds {
            max: narrowed,
            max_source: BoundSource::RiskNarrowing,
            ..bounds.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Nutrient;

    fn curve() -> NutrientResponseCurve {
        NutrientResponseCurve::mitscherlich("corn", Nutrient::Nitrogen, 60.0, 0.02, 250.0)
            .unwrap()
            .with_uncertainty(0.1)
            .unwrap()
    }

    #[test]
    fn neutral_leaves_everything_alone() {
        let p = RiskProfile::new(RiskPreference::Neutral, &RiskConfig::default(), 1.0).unwrap();
        assert_eq!(p.decision_curve(&curve()), curve());
        let b = NutrientBounds::agronomic(250.0);
        assert_eq!(p.narrow(&b), b);
        assert_eq!(p.hurdle, 1.0);
    }

    #[test]
    fn conservative_lowers_curve_narrows_window_raises_hurdle() {
        let p = RiskProfile::new(RiskPreference::Conservative, &RiskConfig::default(), 1.0).unwrap();
        let d = p.decision_curve(&curve());
        assert!((d.y_max - 60.0 * (1.0 - 0.1 * p.z)).abs() < 1e-9);

        let b = p.narrow(&NutrientBounds {
            min: 10.0,
            ..NutrientBounds::agronomic(210.0)
        });
        assert!((b.max - 180.0).abs() < 1e-9);
        assert_eq!(b.max_source, BoundSource::RiskNarrowing);
        assert!((p.hurdle - 1.10).abs() < 1e-12);
    }

    #[test]
    fn conservative_keeps_a_higher_base_hurdle() {
        let p = RiskProfile::new(RiskPreference::Conservative, &RiskConfig::default(), 1.5).unwrap();
        assert_eq!(p.hurdle, 1.5);
    }

    #[test]
    fn aggressive_raises_curve_only() {
        let p = RiskProfile::new(RiskPreference::Aggressive, &RiskConfig::default(), 1.0).unwrap();
        assert!(p.decision_curve(&curve()).y_max > 60.0);
        assert_eq!(p.hurdle, 1.0);
        assert_eq!(p.rate_fraction, 1.0);
    }

    #[test]
    fn fixed_window_is_not_narrowed() {
        let p = RiskProfile::new(RiskPreference::Conservative, &RiskConfig::default(), 1.0).unwrap();
        let pinned = NutrientBounds {
            min: 50.0,
            ..NutrientBounds::agronomic(50.0)
        };
        assert_eq!(p.narrow(&pinned), pinned);
    }
}
