//! Core AllocationOptimizer: fixed-tick greedy over marginal return per dollar

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::OptimizerConfig;
use crate::constraints::NutrientBounds;
use crate::response::{NutrientResponseCurve, DOMAIN_TOLERANCE};
use crate::types::{BindingLimit, Nutrient, OptimizerWarning, StopReason};

use super::OptimizerError;

/// One nutrient as the allocator sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct NutrientCandidate {
    pub nutrient: Nutrient,
    /// Central curve; yield goal and reported yield use it
    pub curve: NutrientResponseCurve,
    /// Risk-adjusted curve ticks are scored on
    pub decision_curve: NutrientResponseCurve,
    /// Rate window after risk narrowing
    pub bounds: NutrientBounds,
    /// Cost per kg of nutrient
    pub unit_cost: f64,
}

/// Fully resolved allocation problem for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationProblem {
    /// In canonical nutrient order
    pub candidates: Vec<NutrientCandidate>,
    pub commodity_price: f64,
    pub budget_ceiling: Option<f64>,
    /// Constraints that set `budget_ceiling`
    pub budget_sources: Vec<String>,
    /// Minimum return per dollar for a tick
    pub hurdle: f64,
    /// Stop once central-curve yield gain reaches this
    pub yield_goal: Option<f64>,
}

/// Final rate of one nutrient.
#[derive(Debug, Clone, PartialEq)]
pub struct NutrientOutcome {
    pub nutrient: Nutrient,
    pub rate: f64,
    /// Set when a rate or spend limit held back a still-profitable nutrient
    pub binding: Option<BindingLimit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerOutcome {
    /// Same order as the problem's candidates
    pub nutrients: Vec<NutrientOutcome>,
    /// Spend at the final rates
    pub total_cost: f64,
    pub stop_reason: StopReason,
    /// Ticks granted
    pub iterations: usize,
    pub binding_constraints: Vec<BindingLimit>,
    pub warnings: Vec<OptimizerWarning>,
}

/// Why a candidate cannot take another tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Blocked {
    RateMaximum,
    SpendCap,
}

/// Next tick for one candidate.
#[derive(Debug, Clone, Copy)]
struct Tick {
    index: usize,
    next_rate: f64,
    score: f64,
}

/// Greedy allocator.
///
/// Starting from every nutrient's minimum, repeatedly grants one tick to the
/// nutrient with the highest incremental return per dollar until no tick
/// clears the hurdle, the next tick would break the budget, or nothing can
/// move. Ties go to the earlier nutrient. Rates are `min + n * tick`, so
/// there is no accumulated drift.
#[derive(Debug, Clone)]
pub struct AllocationOptimizer {
    settings: OptimizerConfig,
}

impl AllocationOptimizer {
    pub fn new(settings: OptimizerConfig) -> Result<Self, OptimizerError> {
        if !settings.tick_kg_ha.is_finite() || settings.tick_kg_ha <= 0.0 {
            return Err(OptimizerError::InvalidSettings(format!(
                "tick_kg_ha must be > 0, got {}",
                settings.tick_kg_ha
            )));
        }
        if !settings.epsilon.is_finite() || settings.epsilon < 0.0 {
            return Err(OptimizerError::InvalidSettings(format!(
                "epsilon must be >= 0, got {}",
                settings.epsilon
            )));
        }
        if settings.max_iterations == 0 {
            return Err(OptimizerError::InvalidSettings(
                "max_iterations must be > 0".to_string(),
            ));
        }
        Ok(Self { settings })
    }

    pub const fn settings(&self) -> &OptimizerConfig {
        &self.settings
    }

    /// Run the greedy allocation.
    ///
    /// `cancel` is polled before every tick; a cancelled run returns no
    /// partial result.
    pub fn optimize(
        &self,
        problem: &OptimizationProblem,
        cancel: Option<&CancellationToken>,
    ) -> Result<OptimizerOutcome, OptimizerError> {
        Self::check_problem(problem)?;

        let threshold = problem.hurdle + self.settings.epsilon;
        let mut ticks = vec![0_usize; problem.candidates.len()];
        let mut rates: Vec<f64> = problem.candidates.iter().map(|c| c.bounds.min).collect();

        if let Some(ceiling) = problem.budget_ceiling {
            let floor_cost = total_cost(&problem.candidates, &rates);
            if floor_cost > ceiling {
                return Err(OptimizerError::InvalidSettings(format!(
                    "minimum rates cost {floor_cost:.2}, above budget ceiling {ceiling:.2}"
                )));
            }
        }

        let mut iterations = 0_usize;
        let mut warnings = Vec::new();

        let stop_reason = loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!(ticks_completed = iterations, "Optimization cancelled");
                return Err(OptimizerError::Cancelled {
                    ticks_completed: iterations,
                });
            }

            if let Some(goal) = problem.yield_goal {
                if central_yield(&problem.candidates, &rates)? >= goal {
                    break StopReason::YieldGoalReached;
                }
            }

            let Some(best) = self.best_tick(problem, &ticks, &rates)? else {
                let spend_capped = problem
                    .candidates
                    .iter()
                    .zip(&ticks)
                    .any(|(c, &t)| self.blocked(c, t) == Some(Blocked::SpendCap));
                break if spend_capped {
                    StopReason::SpendCapped
                } else {
                    StopReason::AllAtMaximum
                };
            };

            if best.score <= threshold {
                break StopReason::BelowHurdle;
            }

            if let Some(ceiling) = problem.budget_ceiling {
                let mut trial = rates.clone();
                trial[best.index] = best.next_rate;
                if total_cost(&problem.candidates, &trial) > ceiling {
                    break StopReason::BudgetExhausted;
                }
            }

            if iterations >= self.settings.max_iterations {
                warn!(
                    iterations,
                    best_score = best.score,
                    "Iteration cap reached with profitable ticks remaining"
                );
                warnings.push(OptimizerWarning::NonConvergence {
                    iterations,
                    best_score: best.score,
                });
                break StopReason::IterationCap;
            }

            ticks[best.index] += 1;
            rates[best.index] = best.next_rate;
            iterations += 1;
        };

        let mut nutrients = Vec::with_capacity(problem.candidates.len());
        let mut binding_constraints = Vec::new();
        for (i, c) in problem.candidates.iter().enumerate() {
            let binding = match self.blocked(c, ticks[i]) {
                Some(blocked)
                    if Self::still_profitable(c, rates[i], problem.commodity_price, threshold)? =>
                {
                    Some(match blocked {
                        Blocked::RateMaximum => BindingLimit::RateMaximum {
                            nutrient: c.nutrient,
                            bound: c.bounds.max_source.clone(),
                        },
                        Blocked::SpendCap => BindingLimit::SpendCap {
                            nutrient: c.nutrient,
                            constraint_id: c.bounds.spend_cap_source.clone().unwrap_or_default(),
                        },
                    })
                }
                _ => None,
            };
            if let Some(b) = &binding {
                binding_constraints.push(b.clone());
            }
            nutrients.push(NutrientOutcome {
                nutrient: c.nutrient,
                rate: rates[i],
                binding,
            });
        }
        if stop_reason == StopReason::BudgetExhausted {
            binding_constraints.push(BindingLimit::Budget {
                constraint_ids: problem.budget_sources.clone(),
            });
        }

        if ticks.iter().all(|&t| t == 0) {
            warnings.push(OptimizerWarning::NoViableAllocation {
                reason: stop_reason,
            });
        }

        let total_cost = total_cost(&problem.candidates, &rates);
        debug!(
            iterations,
            total_cost,
            stop_reason = %stop_reason,
            "Greedy allocation finished"
        );

        Ok(OptimizerOutcome {
            nutrients,
            total_cost,
            stop_reason,
            iterations,
            binding_constraints,
            warnings,
        })
    }

    fn check_problem(problem: &OptimizationProblem) -> Result<(), OptimizerError> {
        if !problem.commodity_price.is_finite() || problem.commodity_price <= 0.0 {
            return Err(OptimizerError::InvalidSettings(format!(
                "commodity price must be > 0, got {}",
                problem.commodity_price
            )));
        }
        if !problem.hurdle.is_finite() || problem.hurdle <= 0.0 {
            return Err(OptimizerError::InvalidSettings(format!(
                "hurdle must be > 0, got {}",
                problem.hurdle
            )));
        }
        for c in &problem.candidates {
            if !c.unit_cost.is_finite() || c.unit_cost <= 0.0 {
                return Err(OptimizerError::InvalidSettings(format!(
                    "unit cost for {} must be > 0, got {}",
                    c.nutrient, c.unit_cost
                )));
            }
            if c.bounds.min < 0.0 || c.bounds.min > c.bounds.max {
                return Err(OptimizerError::InvalidSettings(format!(
                    "empty rate window for {}: [{}, {}]",
                    c.nutrient, c.bounds.min, c.bounds.max
                )));
            }
        }
        Ok(())
    }

    /// Rate after one more tick, capped at the window maximum. `None` once
    /// the maximum is reached.
    fn next_rate(&self, c: &NutrientCandidate, ticks: usize) -> Option<f64> {
        let current = self.rate_at(c, ticks);
        let next = self.rate_at(c, ticks + 1).min(c.bounds.max);
        (next - current > DOMAIN_TOLERANCE).then_some(next)
    }

    fn rate_at(&self, c: &NutrientCandidate, ticks: usize) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let n = ticks as f64;
        (c.bounds.min + n * self.settings.tick_kg_ha).min(c.bounds.max)
    }

    fn blocked(&self, c: &NutrientCandidate, ticks: usize) -> Option<Blocked> {
        let Some(next) = self.next_rate(c, ticks) else {
            return Some(Blocked::RateMaximum);
        };
        match c.bounds.spend_cap {
            Some(cap) if next * c.unit_cost > cap => Some(Blocked::SpendCap),
            _ => None,
        }
    }

    /// Highest-scoring available tick; earlier nutrients win ties.
    fn best_tick(
        &self,
        problem: &OptimizationProblem,
        ticks: &[usize],
        rates: &[f64],
    ) -> Result<Option<Tick>, OptimizerError> {
        let mut best: Option<Tick> = None;
        for (index, c) in problem.candidates.iter().enumerate() {
            if self.blocked(c, ticks[index]).is_some() {
                continue;
            }
            let Some(next_rate) = self.next_rate(c, ticks[index]) else {
                continue;
            };
            let rate = rates[index];
            let gain = c.decision_curve.evaluate(next_rate)? - c.decision_curve.evaluate(rate)?;
            let score = gain * problem.commodity_price / ((next_rate - rate) * c.unit_cost);
            if best.map_or(true, |b| score > b.score) {
                best = Some(Tick {
                    index,
                    next_rate,
                    score,
                });
            }
        }
        Ok(best)
    }

    /// Whether the nutrient would still clear the hurdle at the margin.
    fn still_profitable(
        c: &NutrientCandidate,
        rate: f64,
        commodity_price: f64,
        threshold: f64,
    ) -> Result<bool, OptimizerError> {
        let per_dollar = c.decision_curve.marginal(rate)? * commodity_price / c.unit_cost;
        Ok(per_dollar > threshold)
    }
}

/// Spend at `rates`, summed in candidate order.
///
/// The budget check and the reported total both use this, so the reported
/// cost never exceeds the ceiling the check accepted.
pub(crate) fn total_cost(candidates: &[NutrientCandidate], rates: &[f64]) -> f64 {
    candidates
        .iter()
        .zip(rates)
        .map(|(c, r)| r * c.unit_cost)
        .sum()
}

fn central_yield(candidates: &[NutrientCandidate], rates: &[f64]) -> Result<f64, OptimizerError> {
    let mut total = 0.0;
    for (c, r) in candidates.iter().zip(rates) {
        total += c.curve.evaluate(*r)?;
    }
    Ok(total)
}
