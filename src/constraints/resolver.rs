//! Intersection of constraint bounds into a feasible region

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::types::{
    BoundSide, BoundSource, Constraint, ConstraintKind, ConstraintScope, Nutrient, PreferenceOverride,
};

use super::{ConstraintError, FeasibleRegion, NutrientBounds};

/// Running intersection of one precedence tier's bounds.
#[derive(Debug, Default)]
struct TierBounds {
    min: f64,
    min_source: Option<BoundSource>,
    max: Option<f64>,
    max_source: Option<BoundSource>,
}

impl TierBounds {
    fn apply(&mut self, c: &Constraint) {
        let source = || BoundSource::Constraint {
            id: c.id.clone(),
            kind: c.kind,
        };
        if let Some(lo) = c.min {
            if lo > self.min {
                self.min = lo;
                self.min_source = Some(source());
            }
        }
        if let Some(hi) = c.max {
            if self.max.map_or(true, |m| hi < m) {
                self.max = Some(hi);
                self.max_source = Some(source());
            }
        }
    }

    /// Ids of the bounds that cross, if the window is empty.
    fn conflict(&self) -> Option<Vec<String>> {
        let max = self.max?;
        if self.min <= max {
            return None;
        }
        Some(
            [&self.min_source, &self.max_source]
                .into_iter()
                .flatten()
                .filter_map(|s| s.constraint_id().map(str::to_string))
                .collect(),
        )
    }
}

fn validate_constraint(c: &Constraint, seen: &mut HashSet<String>) -> Result<(), ConstraintError> {
    let invalid = |reason: &str| ConstraintError::Invalid {
        constraint_id: c.id.clone(),
        reason: reason.to_string(),
    };
    if c.id.trim().is_empty() {
        return Err(invalid("constraint id is empty"));
    }
    if !seen.insert(c.id.clone()) {
        return Err(invalid("duplicate constraint id"));
    }
    if c.min.is_none() && c.max.is_none() {
        return Err(invalid("constraint has no bound"));
    }
    for bound in [c.min, c.max].into_iter().flatten() {
        if !bound.is_finite() {
            return Err(invalid("bound is not finite"));
        }
        if bound < 0.0 {
            return Err(invalid("bound is negative"));
        }
    }
    if let (Some(lo), Some(hi)) = (c.min, c.max) {
        if lo > hi {
            return Err(invalid("min exceeds max"));
        }
    }
    if c.kind == ConstraintKind::Budget && c.min.is_some() {
        return Err(invalid("budget constraints take an upper bound only"));
    }
    Ok(())
}

/// Resolve `constraints` into a feasible region for one field.
///
/// `agronomic_max` lists every nutrient in the plan with its curve's maximum
/// rate. Constraints scoped to other fields or unplanned nutrients are
/// ignored.
pub fn resolve(
    constraints: &[Constraint],
    field_id: &str,
    agronomic_max: &BTreeMap<Nutrient, f64>,
) -> Result<FeasibleRegion, ConstraintError> {
    let mut seen = HashSet::new();
    for c in constraints {
        validate_constraint(c, &mut seen)?;
    }

    let active: Vec<&Constraint> = constraints
        .iter()
        .filter(|c| {
            let applies = c.applies_to_field(field_id);
            if !applies {
                debug!(constraint_id = %c.id, field_id, "Constraint scoped to another field, skipping");
            }
            applies
        })
        .collect();

    // Budget: farm/field ceilings aggregate over the sum across nutrients,
    // nutrient-scoped budgets cap that nutrient only.
    let mut budget_ceiling: Option<(f64, String)> = None;
    let mut spend_caps: BTreeMap<Nutrient, (f64, String)> = BTreeMap::new();
    for c in active.iter().filter(|c| c.kind == ConstraintKind::Budget) {
        let Some(cap) = c.max else { continue };
        match &c.scope {
            ConstraintScope::Nutrient(n) => {
                if !agronomic_max.contains_key(n) {
                    debug!(constraint_id = %c.id, nutrient = %n, "Budget for unplanned nutrient, skipping");
                    continue;
                }
                let tighter = spend_caps.get(n).map_or(true, |(cur, _)| cap < *cur);
                if tighter {
                    spend_caps.insert(*n, (cap, c.id.clone()));
                }
            }
            ConstraintScope::Field(_) | ConstraintScope::Farm => {
                if budget_ceiling.as_ref().map_or(true, |(cur, _)| cap < *cur) {
                    budget_ceiling = Some((cap, c.id.clone()));
                }
            }
        }
    }

    let mut bounds = BTreeMap::new();
    let mut overrides = Vec::new();

    for (&nutrient, &agronomic) in agronomic_max {
        let rate_constraints = active
            .iter()
            .filter(|c| c.kind.is_rate_bound() && c.bounds_nutrient(nutrient));

        let mut authority = TierBounds::default();
        let mut preference = TierBounds::default();
        for c in rate_constraints {
            if c.kind.is_authoritative() {
                authority.apply(c);
            } else {
                preference.apply(c);
            }
        }

        if let Some(ids) = authority.conflict() {
            return Err(ConstraintError::Infeasible {
                nutrient: Some(nutrient),
                detail: format!(
                    "{nutrient}: required minimum {:.1} kg/ha exceeds permitted maximum {:.1} kg/ha",
                    authority.min,
                    authority.max.unwrap_or(agronomic)
                ),
                constraint_ids: ids,
            });
        }
        if let Some(ids) = preference.conflict() {
            return Err(ConstraintError::Infeasible {
                nutrient: Some(nutrient),
                detail: format!(
                    "{nutrient}: preferred minimum {:.1} kg/ha exceeds preferred maximum {:.1} kg/ha",
                    preference.min,
                    preference.max.unwrap_or(agronomic)
                ),
                constraint_ids: ids,
            });
        }

        // Authoritative window, clipped to the agronomic domain
        let (mut max, mut max_source) = match (authority.max, authority.max_source.clone()) {
            (Some(m), Some(src)) if m <= agronomic => (m, src),
            _ => (agronomic, BoundSource::AgronomicMax),
        };
        let mut min = authority.min;
        let mut min_source = authority.min_source.clone().unwrap_or(BoundSource::Floor);
        if min > max {
            return Err(ConstraintError::Infeasible {
                nutrient: Some(nutrient),
                detail: format!(
                    "{nutrient}: required minimum {min:.1} kg/ha exceeds agronomic maximum {agronomic:.1} kg/ha"
                ),
                constraint_ids: min_source.constraint_id().map(str::to_string).into_iter().collect(),
            });
        }

        // Preferences move bounds only inside the authoritative window
        if let Some(pref_source) = preference.min_source.clone() {
            let requested = preference.min;
            if requested > max {
                overrides.push(PreferenceOverride {
                    constraint_id: pref_source.constraint_id().unwrap_or_default().to_string(),
                    nutrient,
                    side: BoundSide::Min,
                    requested,
                    enforced: max,
                    enforced_by: max_source.clone(),
                });
                min = max;
                min_source = max_source.clone();
            } else if requested > min {
                min = requested;
                min_source = pref_source;
            }
        }
        if let (Some(requested), Some(pref_source)) = (preference.max, preference.max_source.clone()) {
            if requested < min {
                overrides.push(PreferenceOverride {
                    constraint_id: pref_source.constraint_id().unwrap_or_default().to_string(),
                    nutrient,
                    side: BoundSide::Max,
                    requested,
                    enforced: min,
                    enforced_by: min_source.clone(),
                });
                max = min;
                max_source = min_source.clone();
            } else if requested < max {
                max = requested;
                max_source = pref_source;
            }
        }

        let (spend_cap, spend_cap_source) = spend_caps
            .remove(&nutrient)
            .map_or((None, None), |(cap, id)| (Some(cap), Some(id)));

        debug!(nutrient = %nutrient, min, max, ?spend_cap, "Resolved nutrient bounds");
        bounds.insert(
            nutrient,
            NutrientBounds {
                min,
                max,
                min_source,
                max_source,
                spend_cap,
                spend_cap_source,
            },
        );
    }

    for o in &overrides {
        warn!(
            constraint_id = %o.constraint_id,
            nutrient = %o.nutrient,
            requested = o.requested,
            enforced = o.enforced,
            "User preference overridden by authoritative bound"
        );
    }

    let (budget_ceiling, budget_sources) = match budget_ceiling {
        Some((cap, id)) => (Some(cap), vec![id]),
        None => (None, Vec::new()),
    };

    Ok(FeasibleRegion {
        bounds,
        budget_ceiling,
        budget_sources,
        overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConstraintKind::{EnvironmentalMaxRate, Regulatory, UserPreference};

    fn agronomic() -> BTreeMap<Nutrient, f64> {
        BTreeMap::from([(Nutrient::Nitrogen, 250.0), (Nutrient::Phosphorus, 120.0)])
    }

    #[test]
    fn no_constraints_yields_agronomic_region() {
        let region = resolve(&[], "f1", &agronomic()).unwrap();
        let n = region.bounds(Nutrient::Nitrogen).unwrap();
        assert_eq!((n.min, n.max), (0.0, 250.0));
        assert_eq!(n.max_source, BoundSource::AgronomicMax);
        assert_eq!(n.min_source, BoundSource::Floor);
        assert!(region.budget_ceiling.is_none());
        assert!(region.overrides.is_empty());
    }

    #[test]
    fn tightest_bound_wins() {
        let cs = [
            Constraint::max_rate("env-n", EnvironmentalMaxRate, Nutrient::Nitrogen, 170.0),
            Constraint::max_rate("reg-n", Regulatory, Nutrient::Nitrogen, 150.0),
            Constraint::budget("b-loose", 300.0),
            Constraint::budget("b-tight", 120.0),
        ];
        let region = resolve(&cs, "f1", &agronomic()).unwrap();
        let n = region.bounds(Nutrient::Nitrogen).unwrap();
        assert_eq!(n.max, 150.0);
        assert_eq!(n.max_source.constraint_id(), Some("reg-n"));
        assert_eq!(region.budget_ceiling, Some(120.0));
        assert_eq!(region.budget_sources, vec!["b-tight".to_string()]);
    }

    #[test]
    fn authoritative_conflict_names_both_constraints() {
        let cs = [
            Constraint::rate_range("reg-min", Regulatory, Nutrient::Phosphorus, Some(40.0), None),
            Constraint::max_rate("env-max", EnvironmentalMaxRate, Nutrient::Phosphorus, 30.0),
        ];
        let err = resolve(&cs, "f1", &agronomic()).unwrap_err();
        match err {
            ConstraintError::Infeasible { nutrient, constraint_ids, .. } => {
                assert_eq!(nutrient, Some(Nutrient::Phosphorus));
                assert_eq!(constraint_ids, vec!["reg-min".to_string(), "env-max".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn conflicting_preferences_are_infeasible() {
        let cs = [
            Constraint::rate_range("u1", UserPreference, Nutrient::Nitrogen, Some(100.0), None),
            Constraint::max_rate("u2", UserPreference, Nutrient::Nitrogen, 80.0),
        ];
        assert!(matches!(
            resolve(&cs, "f1", &agronomic()),
            Err(ConstraintError::Infeasible { .. })
        ));
    }

    #[test]
    fn preference_above_regulatory_max_is_clamped_and_reported() {
        let cs = [
            Constraint::max_rate("reg-n", Regulatory, Nutrient::Nitrogen, 50.0),
            Constraint::rate_range("want-n", UserPreference, Nutrient::Nitrogen, Some(80.0), None),
        ];
        let region = resolve(&cs, "f1", &agronomic()).unwrap();
        let n = region.bounds(Nutrient::Nitrogen).unwrap();
        assert_eq!((n.min, n.max), (50.0, 50.0));
        assert_eq!(region.overrides.len(), 1);
        let o = &region.overrides[0];
        assert_eq!(o.constraint_id, "want-n");
        assert_eq!(o.side, BoundSide::Min);
        assert_eq!(o.requested, 80.0);
        assert_eq!(o.enforced, 50.0);
        assert_eq!(o.enforced_by.constraint_id(), Some("reg-n"));
    }

    #[test]
    fn preference_below_regulatory_min_is_clamped() {
        let cs = [
            Constraint::rate_range("reg-p", Regulatory, Nutrient::Phosphorus, Some(20.0), None),
            Constraint::max_rate("no-p", UserPreference, Nutrient::Phosphorus, 0.0),
        ];
        let region = resolve(&cs, "f1", &agronomic()).unwrap();
        let p = region.bounds(Nutrient::Phosphorus).unwrap();
        assert_eq!((p.min, p.max), (20.0, 20.0));
        assert_eq!(region.overrides[0].side, BoundSide::Max);
    }

    #[test]
    fn preference_inside_window_tightens_it() {
        let cs = [
            Constraint::max_rate("env-n", EnvironmentalMaxRate, Nutrient::Nitrogen, 170.0),
            Constraint::rate_range("pref-n", UserPreference, Nutrient::Nitrogen, Some(30.0), Some(120.0)),
        ];
        let region = resolve(&cs, "f1", &agronomic()).unwrap();
        let n = region.bounds(Nutrient::Nitrogen).unwrap();
        assert_eq!((n.min, n.max), (30.0, 120.0));
        assert_eq!(n.max_source.constraint_id(), Some("pref-n"));
        assert!(region.overrides.is_empty());
    }

    #[test]
    fn authoritative_minimum_above_agronomic_max_is_infeasible() {
        let cs = [Constraint::rate_range("reg-p", Regulatory, Nutrient::Phosphorus, Some(130.0), None)];
        let err = resolve(&cs, "f1", &agronomic()).unwrap_err();
        assert!(matches!(err, ConstraintError::Infeasible { ref constraint_ids, .. } if constraint_ids == &["reg-p".to_string()]));
    }

    #[test]
    fn rejects_physically_impossible_constraints() {
        let negative = Constraint::max_rate("neg", Regulatory, Nutrient::Nitrogen, -1.0);
        assert!(matches!(
            resolve(&[negative], "f1", &agronomic()),
            Err(ConstraintError::Invalid { ref constraint_id, .. }) if constraint_id == "neg"
        ));

        let inverted = Constraint::rate_range("inv", UserPreference, Nutrient::Nitrogen, Some(10.0), Some(5.0));
        assert!(resolve(&[inverted], "f1", &agronomic()).is_err());

        let empty = Constraint::rate_range("empty", UserPreference, Nutrient::Nitrogen, None, None);
        assert!(resolve(&[empty], "f1", &agronomic()).is_err());

        let budget_floor = Constraint {
            min: Some(10.0),
            ..Constraint::budget("bf", 100.0)
        };
        assert!(resolve(&[budget_floor], "f1", &agronomic()).is_err());

        let dup = [Constraint::budget("b", 100.0), Constraint::budget("b", 50.0)];
        assert!(resolve(&dup, "f1", &agronomic()).is_err());
    }

    #[test]
    fn field_and_farm_scopes() {
        let cs = [
            Constraint {
                id: "other-field".into(),
                kind: Regulatory,
                scope: ConstraintScope::Field("f2".into()),
                min: None,
                max: Some(10.0),
            },
            Constraint {
                id: "farm-cap".into(),
                kind: EnvironmentalMaxRate,
                scope: ConstraintScope::Farm,
                min: None,
                max: Some(100.0),
            },
        ];
        let region = resolve(&cs, "f1", &agronomic()).unwrap();
        // Farm cap bounds every planned nutrient; other field ignored
        assert_eq!(region.bounds(Nutrient::Nitrogen).unwrap().max, 100.0);
        assert_eq!(region.bounds(Nutrient::Phosphorus).unwrap().max, 100.0);
    }

    #[test]
    fn nutrient_budget_becomes_spend_cap() {
        let cs = [
            Constraint::nutrient_budget("p-spend", Nutrient::Phosphorus, 40.0),
            Constraint::nutrient_budget("k-spend", Nutrient::Potassium, 10.0),
        ];
        let region = resolve(&cs, "f1", &agronomic()).unwrap();
        let p = region.bounds(Nutrient::Phosphorus).unwrap();
        assert_eq!(p.spend_cap, Some(40.0));
        assert_eq!(p.spend_cap_source.as_deref(), Some("p-spend"));
        assert!(region.budget_ceiling.is_none());
        assert!(region.bounds(Nutrient::Potassium).is_none());
    }

    #[test]
    fn minimum_spend_above_budget_is_infeasible() {
        let cs = [
            Constraint::rate_range("reg-n", Regulatory, Nutrient::Nitrogen, Some(60.0), None),
            Constraint::budget("budget", 50.0),
        ];
        let region = resolve(&cs, "f1", &agronomic()).unwrap();
        let costs = BTreeMap::from([(Nutrient::Nitrogen, 1.0), (Nutrient::Phosphorus, 2.0)]);
        let err = region.check_minimum_spend(&costs).unwrap_err();
        match err {
            ConstraintError::Infeasible { nutrient, constraint_ids, .. } => {
                assert_eq!(nutrient, None);
                assert!(constraint_ids.contains(&"budget".to_string()));
                assert!(constraint_ids.contains(&"reg-n".to_string()));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let roomy = resolve(&[Constraint::budget("budget", 80.0), cs[0].clone()], "f1", &agronomic()).unwrap();
        assert!(roomy.check_minimum_spend(&costs).is_ok());
    }
}
