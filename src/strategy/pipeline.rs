//! Strategy pipeline: one request through every stage
//!
//! ```text
//! STAGE 1: Validate request (ids, yield goal, nutrient list)
//! STAGE 2: Curves for the planned nutrients
//! STAGE 3: Resolve constraints into a feasible region
//! STAGE 4: Unit costs and commodity price from one snapshot
//! STAGE 5: Minimum-spend feasibility
//! STAGE 6: Risk profile (decision curves, narrowed windows, hurdle)
//! STAGE 7: Greedy allocation
//! STAGE 8: Economics and confidence band
//! ```
//!
//! Pure: no I/O, no clock, no randomness. The snapshot is resolved by the
//! caller so every price in the result comes from it.

use std::collections::{BTreeMap, HashSet};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::analysis::summarize;
use crate::constraints::{resolve, FeasibleRegion};
use crate::error::StrategyError;
use crate::market::PriceSnapshot;
use crate::optimization::{
    confidence_interval, AllocationOptimizer, NutrientCandidate, OptimizationProblem,
    OptimizerOutcome, RiskProfile, YieldContribution,
};
use crate::response::{CurveSource, NutrientResponseCurve};
use crate::types::{
    AllocationResult, Nutrient, NutrientAllocation, OptimizationRequest, OptimizerWarning,
};

use super::ManagerSettings;

/// Reject malformed requests before any lookup.
pub fn validate_request(request: &OptimizationRequest) -> Result<(), StrategyError> {
    for (field, value) in [
        ("field_id", &request.field_id),
        ("crop_id", &request.crop_id),
        ("price_snapshot_id", &request.price_snapshot_id),
    ] {
        if value.trim().is_empty() {
            return Err(StrategyError::invalid(field, "must not be empty"));
        }
    }

    if let Some(goal) = request.target_yield_goal {
        if !goal.is_finite() || goal <= 0.0 {
            return Err(StrategyError::invalid(
                "target_yield_goal",
                format!("must be > 0, got {goal}"),
            ));
        }
    }

    if let Some(nutrients) = &request.nutrients {
        if nutrients.is_empty() {
            return Err(StrategyError::invalid("nutrients", "must not be empty"));
        }
        let mut seen = HashSet::new();
        for n in nutrients {
            if !seen.insert(*n) {
                return Err(StrategyError::invalid("nutrients", format!("{n} listed twice")));
            }
        }
    }

    let mut ids = HashSet::new();
    for c in &request.constraints {
        if !ids.insert(c.id.as_str()) {
            return Err(StrategyError::invalid(
                "constraints",
                format!("duplicate constraint id '{}'", c.id),
            ));
        }
    }
    Ok(())
}

/// Nutrients to plan, in canonical order.
fn planned_nutrients(
    curves: &dyn CurveSource,
    request: &OptimizationRequest,
) -> Result<Vec<Nutrient>, StrategyError> {
    let mut nutrients = match &request.nutrients {
        Some(list) => list.clone(),
        None => curves.nutrients_for(&request.crop_id),
    };
    if nutrients.is_empty() {
        return Err(StrategyError::invalid(
            "crop_id",
            format!("no response curves for crop '{}'", request.crop_id),
        ));
    }
    nutrients.sort_unstable();
    Ok(nutrients)
}

/// Run one request against `snapshot`.
///
/// `snapshot` must be the one `request.price_snapshot_id` names.
pub fn run_pipeline(
    curves: &dyn CurveSource,
    snapshot: &PriceSnapshot,
    request: &OptimizationRequest,
    settings: &ManagerSettings,
    cancel: Option<&CancellationToken>,
) -> Result<AllocationResult, StrategyError> {
    // STAGE 1
    validate_request(request)?;

    // STAGE 2
    let nutrients = planned_nutrients(curves, request)?;
    let mut central = BTreeMap::new();
    for &n in &nutrients {
        central.insert(n, curves.curve(&request.crop_id, n)?);
    }

    // STAGE 3
    let agronomic_max: BTreeMap<Nutrient, f64> =
        central.iter().map(|(n, c)| (*n, c.max_rate)).collect();
    let region = resolve(&request.constraints, &request.field_id, &agronomic_max)?;

    // STAGE 4: nutrients first, then the crop
    let mut unit_costs = BTreeMap::new();
    for &n in &nutrients {
        unit_costs.insert(n, snapshot.nutrient_unit_cost(n)?);
    }
    let commodity_price = snapshot.commodity_price(&request.crop_id)?;

    // STAGE 5
    region.check_minimum_spend(&unit_costs)?;

    // STAGE 6
    let risk = RiskProfile::new(
        request.risk_preference,
        &settings.risk,
        settings.optimizer.hurdle_rate,
    )?;
    let mut candidates = Vec::with_capacity(nutrients.len());
    for (n, curve) in central {
        let (Some(bounds), Some(&unit_cost)) = (region.bounds(n), unit_costs.get(&n)) else {
            continue;
        };
        candidates.push(NutrientCandidate {
            nutrient: n,
            decision_curve: risk.decision_curve(&curve),
            curve,
            bounds: risk.narrow(bounds),
            unit_cost,
        });
    }

    // STAGE 7
    let problem = OptimizationProblem {
        candidates,
        commodity_price,
        budget_ceiling: region.budget_ceiling,
        budget_sources: region.budget_sources.clone(),
        hurdle: risk.hurdle,
        yield_goal: request.target_yield_goal,
    };
    let outcome = AllocationOptimizer::new(settings.optimizer.clone())?.optimize(&problem, cancel)?;

    debug!(
        field_id = %request.field_id,
        crop_id = %request.crop_id,
        snapshot_id = %snapshot.snapshot_id,
        risk = %request.risk_preference,
        stop_reason = %outcome.stop_reason,
        iterations = outcome.iterations,
        "Allocation computed"
    );

    // STAGE 8
    assemble_result(request, snapshot, &region, &risk, &problem, outcome, settings)
}

/// Attach per-nutrient detail, economics and the confidence band.
fn assemble_result(
    request: &OptimizationRequest,
    snapshot: &PriceSnapshot,
    region: &FeasibleRegion,
    risk: &RiskProfile,
    problem: &OptimizationProblem,
    outcome: OptimizerOutcome,
    settings: &ManagerSettings,
) -> Result<AllocationResult, StrategyError> {
    let price = problem.commodity_price;
    let mut allocations = Vec::with_capacity(outcome.nutrients.len());
    let mut contributions = Vec::with_capacity(outcome.nutrients.len());
    let mut yield_delta = 0.0;

    for (candidate, n) in problem.candidates.iter().zip(outcome.nutrients) {
        let curve: &NutrientResponseCurve = &candidate.curve;
        let contribution = curve.evaluate(n.rate)?;
        let marginal = curve.marginal(n.rate)?;
        yield_delta += contribution;
        contributions.push(YieldContribution {
            yield_delta: contribution,
            relative_std_dev: curve.uncertainty.relative_std_dev,
        });
        allocations.push(NutrientAllocation {
            nutrient: n.nutrient,
            rate_kg_ha: n.rate,
            min_rate: candidate.bounds.min,
            max_rate: candidate.bounds.max,
            unit_cost: candidate.unit_cost,
            cost: n.rate * candidate.unit_cost,
            yield_delta: contribution,
            marginal_return_per_dollar: marginal * price / candidate.unit_cost,
            binding: n.binding,
        });
    }

    let economics = summarize(outcome.total_cost, yield_delta, price);
    let interval = confidence_interval(
        settings.risk.confidence_level,
        risk.z,
        &contributions,
        price,
        outcome.total_cost,
    );

    let mut warnings: Vec<OptimizerWarning> = region
        .overrides
        .iter()
        .cloned()
        .map(OptimizerWarning::PreferenceOverridden)
        .collect();
    warnings.extend(outcome.warnings);

    Ok(AllocationResult {
        field_id: request.field_id.clone(),
        crop_id: request.crop_id.clone(),
        snapshot_id: snapshot.snapshot_id.clone(),
        currency: snapshot.currency.clone(),
        risk_preference: request.risk_preference,
        allocations,
        economics,
        confidence_interval: interval,
        budget_ceiling: region.budget_ceiling,
        unspent_budget: region
            .budget_ceiling
            .map(|ceiling| (ceiling - outcome.total_cost).max(0.0)),
        stop_reason: outcome.stop_reason,
        iterations: outcome.iterations,
        binding_constraints: outcome.binding_constraints,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::PriceError;
    use crate::response::CurveLibrary;
    use crate::types::{Constraint, ConstraintKind, RiskPreference, StopReason};
    use chrono::Utc;

    fn curves() -> CurveLibrary {
        CurveLibrary::new([
            NutrientResponseCurve::mitscherlich("corn", Nutrient::Nitrogen, 60.0, 0.02, 250.0)
                .unwrap()
                .with_uncertainty(0.10)
                .unwrap(),
            NutrientResponseCurve::mitscherlich("corn", Nutrient::Phosphorus, 30.0, 0.03, 120.0)
                .unwrap()
                .with_uncertainty(0.10)
                .unwrap(),
        ])
        .unwrap()
    }

    fn snapshot() -> PriceSnapshot {
        PriceSnapshot::new("s1", Utc::now(), "USD")
            .with_fertilizer("urea-n", Nutrient::Nitrogen, 1.0, 1.0)
            .with_fertilizer("p-elemental", Nutrient::Phosphorus, 1.0, 2.0)
            .with_commodity("corn", 5.0)
    }

    fn run(request: &OptimizationRequest) -> Result<AllocationResult, StrategyError> {
        run_pipeline(&curves(), &snapshot(), request, &ManagerSettings::default(), None)
    }

    #[test]
    fn corn_budget_result_is_fully_assembled() {
        let req = OptimizationRequest::new("f1", "corn", "s1")
            .with_constraint(Constraint::budget("budget", 100.0));
        let r = run(&req).unwrap();

        assert_eq!(r.snapshot_id, "s1");
        assert_eq!(r.currency, "USD");
        assert_eq!(r.allocations.len(), 2);
        assert_eq!(r.allocations[0].nutrient, Nutrient::Nitrogen);
        assert_eq!(r.stop_reason, StopReason::BudgetExhausted);
        assert!(r.total_cost() <= 100.0);
        assert_eq!(r.budget_ceiling, Some(100.0));
        assert!(r.unspent_budget.unwrap() < 0.3);
        assert_eq!(r.binding_constraint_ids(), vec!["budget"]);

        let yield_sum: f64 = r.allocations.iter().map(|a| a.yield_delta).sum();
        assert!((r.economics.yield_delta - yield_sum).abs() < 1e-9);
        assert!(r.confidence_interval.yield_delta_low < r.economics.yield_delta);
        assert!(r.confidence_interval.yield_delta_high > r.economics.yield_delta);
        // Interior nutrients end near equal marginal return per dollar
        let m: Vec<f64> = r.allocations.iter().map(|a| a.marginal_return_per_dollar).collect();
        assert!((m[0] - m[1]).abs() < 0.02);
    }

    #[test]
    fn missing_crop_price_is_fatal() {
        let req = OptimizationRequest::new("f1", "wheat", "s1");
        let lib = CurveLibrary::new([NutrientResponseCurve::mitscherlich(
            "wheat",
            Nutrient::Nitrogen,
            40.0,
            0.02,
            200.0,
        )
        .unwrap()])
        .unwrap();
        let err = run_pipeline(&lib, &snapshot(), &req, &ManagerSettings::default(), None).unwrap_err();
        assert_eq!(
            err,
            StrategyError::Price(PriceError::PriceNotFound {
                snapshot_id: "s1".into(),
                item: "wheat".into()
            })
        );
    }

    #[test]
    fn unknown_crop_without_nutrient_list_is_invalid() {
        let err = run(&OptimizationRequest::new("f1", "barley", "s1")).unwrap_err();
        assert!(matches!(err, StrategyError::InvalidRequest { ref field, .. } if field == "crop_id"));
    }

    #[test]
    fn explicit_nutrient_without_curve_is_not_found() {
        let req = OptimizationRequest::new("f1", "corn", "s1").with_nutrients(&[Nutrient::Potassium]);
        assert!(matches!(run(&req), Err(StrategyError::Curve(_))));
    }

    #[test]
    fn validation_rejects_malformed_requests() {
        let empty_field = OptimizationRequest::new(" ", "corn", "s1");
        assert!(matches!(
            validate_request(&empty_field),
            Err(StrategyError::InvalidRequest { ref field, .. }) if field == "field_id"
        ));

        let bad_goal = OptimizationRequest::new("f1", "corn", "s1").with_yield_goal(0.0);
        assert!(validate_request(&bad_goal).is_err());

        let no_nutrients = OptimizationRequest::new("f1", "corn", "s1").with_nutrients(&[]);
        assert!(validate_request(&no_nutrients).is_err());

        let twice = OptimizationRequest::new("f1", "corn", "s1")
            .with_nutrients(&[Nutrient::Nitrogen, Nutrient::Nitrogen]);
        assert!(validate_request(&twice).is_err());

        let dup = OptimizationRequest::new("f1", "corn", "s1")
            .with_constraint(Constraint::budget("b", 10.0))
            .with_constraint(Constraint::budget("b", 20.0));
        assert!(matches!(
            validate_request(&dup),
            Err(StrategyError::InvalidRequest { ref field, .. }) if field == "constraints"
        ));
    }

    #[test]
    fn preference_override_surfaces_as_warning() {
        let req = OptimizationRequest::new("f1", "corn", "s1")
            .with_constraint(Constraint::max_rate(
                "reg-n",
                ConstraintKind::Regulatory,
                Nutrient::Nitrogen,
                60.0,
            ))
            .with_constraint(Constraint::rate_range(
                "pref-n",
                ConstraintKind::UserPreference,
                Nutrient::Nitrogen,
                Some(70.0),
                Some(120.0),
            ));
        let r = run(&req).unwrap();
        assert!(r.rate(Nutrient::Nitrogen) <= 60.0 + 1e-9);
        assert!(r.warnings.iter().any(|w| matches!(
            w,
            OptimizerWarning::PreferenceOverridden(o) if o.constraint_id == "pref-n"
        )));
    }

    #[test]
    fn conservative_plans_within_narrowed_window() {
        let req = OptimizationRequest::new("f1", "corn", "s1").with_risk(RiskPreference::Conservative);
        let r = run(&req).unwrap();
        let n = r.allocation(Nutrient::Nitrogen).unwrap();
        assert!((n.max_rate - 250.0 * 0.85).abs() < 1e-9);
        assert_eq!(r.risk_preference, RiskPreference::Conservative);

        let neutral = run(&OptimizationRequest::new("f1", "corn", "s1")).unwrap();
        for a in &r.allocations {
            assert!(a.rate_kg_ha <= neutral.rate(a.nutrient) + 1e-9);
        }
    }
}
