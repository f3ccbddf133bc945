//! Response curve lookup

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::Nutrient;

use super::{CurveError, NutrientResponseCurve};

/// Source of curated response curves.
///
/// Implementations must be thread-safe; many requests read concurrently.
pub trait CurveSource: Send + Sync {
    /// Curve for `(crop_id, nutrient)`, or `CurveError::NotFound`.
    fn curve(&self, crop_id: &str, nutrient: Nutrient) -> Result<NutrientResponseCurve, CurveError>;

    /// Nutrients with a curve for `crop_id`, in canonical order.
    fn nutrients_for(&self, crop_id: &str) -> Vec<Nutrient>;
}

/// Immutable in-memory curve table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<NutrientResponseCurve>", into = "Vec<NutrientResponseCurve>")]
pub struct CurveLibrary {
    curves: BTreeMap<(String, Nutrient), NutrientResponseCurve>,
}

impl CurveLibrary {
    /// Build from curated curves. Each curve is validated and a crop may
    /// carry only one curve per nutrient.
    pub fn new(curves: impl IntoIterator<Item = NutrientResponseCurve>) -> Result<Self, CurveError> {
        let mut map = BTreeMap::new();
        for curve in curves {
            curve.validate()?;
            let key = (curve.crop_id.clone(), curve.nutrient);
            if map.contains_key(&key) {
                return Err(CurveError::InvalidParameters {
                    crop_id: curve.crop_id,
                    nutrient: curve.nutrient,
                    reason: "duplicate curve for crop and nutrient".to_string(),
                });
            }
            map.insert(key, curve);
        }
        Ok(Self { curves: map })
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    pub fn crops(&self) -> Vec<&str> {
        let mut crops: Vec<&str> = self.curves.keys().map(|(c, _)| c.as_str()).collect();
        crops.dedup();
        crops
    }
}

impl CurveSource for CurveLibrary {
    fn curve(&self, crop_id: &str, nutrient: Nutrient) -> Result<NutrientResponseCurve, CurveError> {
        self.curves
            .get(&(crop_id.to_string(), nutrient))
            .cloned()
            .ok_or_else(|| CurveError::NotFound {
                crop_id: crop_id.to_string(),
                nutrient,
            })
    }

    fn nutrients_for(&self, crop_id: &str) -> Vec<Nutrient> {
        self.curves
            .keys()
            .filter(|(c, _)| c == crop_id)
            .map(|(_, n)| *n)
            .collect()
    }
}

impl TryFrom<Vec<NutrientResponseCurve>> for CurveLibrary {
    type Error = CurveError;

    fn try_from(curves: Vec<NutrientResponseCurve>) -> Result<Self, Self::Error> {
        Self::new(curves)
    }
}

impl From<CurveLibrary> for Vec<NutrientResponseCurve> {
    fn from(library: CurveLibrary) -> Self {
        library.curves.into_values().collect()
    }
}
