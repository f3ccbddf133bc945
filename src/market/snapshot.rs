//! Immutable price snapshot and price lookup

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Nutrient;

use super::PriceError;

/// One fertilizer product quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FertilizerQuote {
    /// Product name, e.g. "urea"
    pub product: String,
    /// Nutrient the product supplies
    pub nutrient: Nutrient,
    /// Mass fraction of the nutrient in the product (0, 1]
    pub nutrient_fraction: f64,
    /// Price per kg of product
    pub price_per_kg: f64,
}

impl FertilizerQuote {
    /// Cost of one kg of the nutrient delivered through this product.
    pub fn cost_per_kg_nutrient(&self) -> f64 {
        self.price_per_kg / self.nutrient_fraction
    }
}

/// Commodity price for one crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommodityPrice {
    pub crop_id: String,
    /// Price per unit of yield (the unit the crop's response curves use)
    pub price_per_unit: f64,
}

/// What to look up in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PriceKey {
    /// Per-kg price of a named product
    Product(String),
    /// Cheapest per-kg cost of a nutrient across its products
    Nutrient(Nutrient),
    /// Commodity price of a crop
    Commodity(String),
}

impl std::fmt::Display for PriceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Product(p) => write!(f, "{p}"),
            Self::Nutrient(n) => write!(f, "{n}"),
            Self::Commodity(c) => write!(f, "{c}"),
        }
    }
}

/// Normalized market prices at one instant.
///
/// Never mutated after publication; a newer snapshot supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub snapshot_id: String,
    pub timestamp: DateTime<Utc>,
    pub currency: String,
    #[serde(default)]
    pub fertilizers: Vec<FertilizerQuote>,
    #[serde(default)]
    pub commodities: Vec<CommodityPrice>,
}

impl PriceSnapshot {
    pub fn new(snapshot_id: impl Into<String>, timestamp: DateTime<Utc>, currency: impl Into<String>) -> Self {
        Self {
            snapshot_id: snapshot_id.into(),
            timestamp,
            currency: currency.into(),
            fertilizers: Vec::new(),
            commodities: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_fertilizer(
        mut self,
        product: impl Into<String>,
        nutrient: Nutrient,
        nutrient_fraction: f64,
        price_per_kg: f64,
    ) -> Self {
        self.fertilizers.push(FertilizerQuote {
            product: product.into(),
            nutrient,
            nutrient_fraction,
            price_per_kg,
        });
        self
    }

    #[must_use]
    pub fn with_commodity(mut self, crop_id: impl Into<String>, price_per_unit: f64) -> Self {
        self.commodities.push(CommodityPrice {
            crop_id: crop_id.into(),
            price_per_unit,
        });
        self
    }

    /// Reject quotes that would let the optimizer see free or negative inputs.
    pub fn validate(&self) -> Result<(), PriceError> {
        let invalid = |item: &str, reason: String| PriceError::InvalidQuote {
            snapshot_id: self.snapshot_id.clone(),
            item: item.to_string(),
            reason,
        };
        if self.snapshot_id.trim().is_empty() {
            return Err(invalid("snapshot_id", "snapshot id is empty".to_string()));
        }
        for q in &self.fertilizers {
            if !q.price_per_kg.is_finite() || q.price_per_kg <= 0.0 {
                return Err(invalid(&q.product, format!("price_per_kg must be > 0, got {}", q.price_per_kg)));
            }
            if !q.nutrient_fraction.is_finite() || q.nutrient_fraction <= 0.0 || q.nutrient_fraction > 1.0 {
                return Err(invalid(
                    &q.product,
                    format!("nutrient_fraction must be in (0, 1], got {}", q.nutrient_fraction),
                ));
            }
        }
        for c in &self.commodities {
            if !c.price_per_unit.is_finite() || c.price_per_unit <= 0.0 {
                return Err(invalid(&c.crop_id, format!("price_per_unit must be > 0, got {}", c.price_per_unit)));
            }
        }
        Ok(())
    }

    fn not_found(&self, key: &PriceKey) -> PriceError {
        PriceError::PriceNotFound {
            snapshot_id: self.snapshot_id.clone(),
            item: key.to_string(),
        }
    }

    /// Unit price for `key`. Missing entries are an error, never zero.
    pub fn get_price(&self, key: &PriceKey) -> Result<f64, PriceError> {
        let price = match key {
            PriceKey::Product(name) => self
                .fertilizers
                .iter()
                .find(|q| &q.product == name)
                .map(|q| q.price_per_kg),
            PriceKey::Nutrient(n) => self
                .fertilizers
                .iter()
                .filter(|q| q.nutrient == *n)
                .map(FertilizerQuote::cost_per_kg_nutrient)
                .min_by(f64::total_cmp),
            PriceKey::Commodity(crop) => self
                .commodities
                .iter()
                .find(|c| &c.crop_id == crop)
                .map(|c| c.price_per_unit),
        };
        price.ok_or_else(|| self.not_found(key))
    }

    pub fn nutrient_unit_cost(&self, nutrient: Nutrient) -> Result<f64, PriceError> {
        self.get_price(&PriceKey::Nutrient(nutrient))
    }

    pub fn commodity_price(&self, crop_id: &str) -> Result<f64, PriceError> {
        self.get_price(&PriceKey::Commodity(crop_id.to_string()))
    }

    /// Whether every input a plan needs is priced here.
    pub fn prices_all(&self, crop_id: &str, nutrients: &[Nutrient]) -> bool {
        self.commodity_price(crop_id).is_ok()
            && nutrients.iter().all(|n| self.nutrient_unit_cost(*n).is_ok())
    }

    /// Derived snapshot with commodity and fertilizer prices scaled.
    #[must_use]
    pub fn scaled(&self, snapshot_id: impl Into<String>, commodity_factor: f64, fertilizer_factor: f64) -> Self {
        Self {
            snapshot_id: snapshot_id.into(),
            timestamp: self.timestamp,
            currency: self.currency.clone(),
            fertilizers: self
                .fertilizers
                .iter()
                .map(|q| FertilizerQuote {
                    price_per_kg: q.price_per_kg * fertilizer_factor,
                    ..q.clone()
                })
                .collect(),
            commodities: self
                .commodities
                .iter()
                .map(|c| CommodityPrice {
                    price_per_unit: c.price_per_unit * commodity_factor,
                    ..c.clone()
                })
                .collect(),
        }
    }
}

impl AsRef<PriceSnapshot> for PriceSnapshot {
    fn as_ref(&self) -> &PriceSnapshot {
        self
    }
}

/// Unit price for `key` in `snapshot`.
pub fn get_price(snapshot: &PriceSnapshot, key: &PriceKey) -> Result<f64, PriceError> {
    snapshot.get_price(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PriceSnapshot {
        PriceSnapshot::new("2026-03", Utc::now(), "USD")
            .with_fertilizer("urea", Nutrient::Nitrogen, 0.46, 0.69)
            .with_fertilizer("uan32", Nutrient::Nitrogen, 0.32, 0.40)
            .with_fertilizer("map", Nutrient::Phosphorus, 0.22, 0.88)
            .with_commodity("corn", 5.0)
    }

    #[test]
    fn nutrient_cost_picks_cheapest_product() {
        let s = snapshot();
        // urea: 0.69 / 0.46 = 1.50; uan32: 0.40 / 0.32 = 1.25
        let n = s.nutrient_unit_cost(Nutrient::Nitrogen).unwrap();
        assert!((n - 1.25).abs() < 1e-12);
        let p = s.nutrient_unit_cost(Nutrient::Phosphorus).unwrap();
        assert!((p - 4.0).abs() < 1e-12);
    }

    #[test]
    fn product_and_commodity_lookup() {
        let s = snapshot();
        assert_eq!(s.get_price(&PriceKey::Product("urea".into())).unwrap(), 0.69);
        assert_eq!(get_price(&s, &PriceKey::Commodity("corn".into())).unwrap(), 5.0);
    }

    #[test]
    fn missing_price_names_the_item() {
        let s = snapshot();
        let err = s.nutrient_unit_cost(Nutrient::Potassium).unwrap_err();
        assert_eq!(
            err,
            PriceError::PriceNotFound {
                snapshot_id: "2026-03".into(),
                item: "K".into()
            }
        );
        assert!(s.commodity_price("soy").is_err());
        assert!(!s.prices_all("corn", &[Nutrient::Nitrogen, Nutrient::Potassium]));
        assert!(s.prices_all("corn", &[Nutrient::Nitrogen, Nutrient::Phosphorus]));
    }

    #[test]
    fn validation_rejects_free_inputs() {
        let zero = PriceSnapshot::new("bad", Utc::now(), "USD").with_fertilizer("urea", Nutrient::Nitrogen, 0.46, 0.0);
        assert!(matches!(zero.validate(), Err(PriceError::InvalidQuote { .. })));

        let fraction = PriceSnapshot::new("bad", Utc::now(), "USD").with_fertilizer("urea", Nutrient::Nitrogen, 1.2, 0.5);
        assert!(fraction.validate().is_err());

        let commodity = PriceSnapshot::new("bad", Utc::now(), "USD").with_commodity("corn", -5.0);
        assert!(commodity.validate().is_err());

        assert!(snapshot().validate().is_ok());
    }

    #[test]
    fn scaled_snapshot_leaves_source_untouched() {
        let s = snapshot();
        let up = s.scaled("2026-03+10", 1.1, 1.0);
        assert!((up.commodity_price("corn").unwrap() - 5.5).abs() < 1e-12);
        assert_eq!(s.commodity_price("corn").unwrap(), 5.0);
        assert_eq!(up.nutrient_unit_cost(Nutrient::Nitrogen).unwrap(), s.nutrient_unit_cost(Nutrient::Nitrogen).unwrap());
    }
}
