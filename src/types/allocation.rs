//! Optimization outputs: allocation results, scenario comparisons, and the
//! records the strategy store keeps for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ConstraintKind, Nutrient, OptimizationRequest, RiskPreference};

// ============================================================================
// Bounds provenance
// ============================================================================

/// Where a resolved rate bound came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum BoundSource {
    /// Physical floor of zero; no constraint set a minimum
    Floor,
    /// Agronomic maximum of the response curve
    AgronomicMax,
    /// An explicit constraint
    Constraint { id: String, kind: ConstraintKind },
    /// Narrowed by a conservative risk preference
    RiskNarrowing,
}

impl BoundSource {
    pub fn constraint_id(&self) -> Option<&str> {
        match self {
            Self::Constraint { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Which side of a rate window a preference tried to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundSide {
    Min,
    Max,
}

/// A user preference that an environmental or regulatory bound overrode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceOverride {
    pub constraint_id: String,
    pub nutrient: Nutrient,
    pub side: BoundSide,
    pub requested: f64,
    pub enforced: f64,
    /// The bound that won
    pub enforced_by: BoundSource,
}

// ============================================================================
// Optimizer diagnostics
// ============================================================================

/// Why the greedy allocation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The next best tick would exceed the budget ceiling.
    ///
    /// Allocation halts there even if a cheaper tick would still fit, so up
    /// to one tick of the best nutrient (`tick * unit_cost`) can stay unspent.
    BudgetExhausted,
    /// No tick returns more than the hurdle per dollar
    BelowHurdle,
    /// Every nutrient reached its maximum rate
    AllAtMaximum,
    /// Nothing can move and at least one nutrient is held by its spend cap
    SpendCapped,
    /// Predicted yield gain reached the requested goal
    YieldGoalReached,
    /// Iteration cap reached with profitable ticks remaining
    IterationCap,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetExhausted => write!(f, "budget exhausted"),
            Self::BelowHurdle => write!(f, "marginal return below hurdle"),
            Self::AllAtMaximum => write!(f, "all nutrients at maximum"),
            Self::SpendCapped => write!(f, "remaining nutrients at spend cap"),
            Self::YieldGoalReached => write!(f, "yield goal reached"),
            Self::IterationCap => write!(f, "iteration cap reached"),
        }
    }
}

/// A limit that stopped further allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "limit", rename_all = "snake_case")]
pub enum BindingLimit {
    /// Nutrient held at its maximum rate while still profitable
    RateMaximum { nutrient: Nutrient, bound: BoundSource },
    /// Nutrient held at its spend cap while still profitable
    SpendCap { nutrient: Nutrient, constraint_id: String },
    /// Total budget ceiling
    Budget { constraint_ids: Vec<String> },
}

impl BindingLimit {
    /// Ids of the constraints that bind, if any.
    pub fn constraint_ids(&self) -> Vec<&str> {
        match self {
            Self::RateMaximum { bound, .. } => bound.constraint_id().into_iter().collect(),
            Self::SpendCap { constraint_id, .. } => vec![constraint_id.as_str()],
            Self::Budget { constraint_ids } => constraint_ids.iter().map(String::as_str).collect(),
        }
    }
}

/// Non-fatal conditions attached to a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum OptimizerWarning {
    /// Every rate stayed at its minimum; a valid outcome
    NoViableAllocation { reason: StopReason },
    /// Iteration cap hit before convergence; result is the best found
    NonConvergence { iterations: usize, best_score: f64 },
    /// A preference was clamped to an authoritative bound
    PreferenceOverridden(PreferenceOverride),
}

// ============================================================================
// Allocation Result
// ============================================================================

/// Economics of an allocation under one price snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicSummary {
    /// Fertilizer spend (currency/ha)
    pub total_cost: f64,
    /// Predicted yield gain (commodity units/ha)
    pub yield_delta: f64,
    pub commodity_price: f64,
    /// Revenue from the yield gain: `yield_delta * commodity_price`
    pub net_revenue_delta: f64,
    /// `net_revenue_delta - total_cost`
    pub net_return: f64,
    /// `(net_revenue_delta - total_cost) / total_cost * 100`; `None` at zero cost
    pub roi_percent: Option<f64>,
    /// Commodity price at which revenue equals cost
    pub break_even_price: Option<f64>,
    /// Yield gain at which revenue equals cost
    pub break_even_yield: Option<f64>,
}

/// Band around the predicted outcome from curve uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Two-sided coverage (e.g. 0.90)
    pub level: f64,
    pub yield_delta_low: f64,
    pub yield_delta_high: f64,
    pub net_return_low: f64,
    pub net_return_high: f64,
}

/// One nutrient's share of an allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientAllocation {
    pub nutrient: Nutrient,
    /// Applied rate (kg/ha)
    pub rate_kg_ha: f64,
    /// Resolved feasible minimum (kg/ha)
    pub min_rate: f64,
    /// Resolved feasible maximum after risk narrowing (kg/ha)
    pub max_rate: f64,
    /// Cost per kg of nutrient
    pub unit_cost: f64,
    pub cost: f64,
    /// Yield contribution on the central curve
    pub yield_delta: f64,
    /// `marginal(rate) * commodity_price / unit_cost` on the central curve
    pub marginal_return_per_dollar: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<BindingLimit>,
}

/// Outcome of one optimization run.
///
/// Holds no wall-clock or random data: identical inputs produce an identical
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub field_id: String,
    pub crop_id: String,
    /// Snapshot every price in this result came from
    pub snapshot_id: String,
    pub currency: String,
    pub risk_preference: RiskPreference,
    /// Per-nutrient allocation in canonical nutrient order
    pub allocations: Vec<NutrientAllocation>,
    pub economics: EconomicSummary,
    pub confidence_interval: ConfidenceInterval,
    /// `None` when no budget constraint applied
    pub budget_ceiling: Option<f64>,
    pub unspent_budget: Option<f64>,
    pub stop_reason: StopReason,
    pub iterations: usize,
    pub binding_constraints: Vec<BindingLimit>,
    pub warnings: Vec<OptimizerWarning>,
}

impl AllocationResult {
    pub fn allocation(&self, nutrient: Nutrient) -> Option<&NutrientAllocation> {
        self.allocations.iter().find(|a| a.nutrient == nutrient)
    }

    /// Applied rate for `nutrient`, zero when it was not planned.
    pub fn rate(&self, nutrient: Nutrient) -> f64 {
        self.allocation(nutrient).map_or(0.0, |a| a.rate_kg_ha)
    }

    pub const fn total_cost(&self) -> f64 {
        self.economics.total_cost
    }

    pub const fn roi_percent(&self) -> Option<f64> {
        self.economics.roi_percent
    }

    /// True when every rate sits at its feasible minimum.
    pub fn is_zero_allocation(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, OptimizerWarning::NoViableAllocation { .. }))
    }

    pub fn is_converged(&self) -> bool {
        !self
            .warnings
            .iter()
            .any(|w| matches!(w, OptimizerWarning::NonConvergence { .. }))
    }

    /// Every constraint id that limited this allocation.
    pub fn binding_constraint_ids(&self) -> Vec<&str> {
        self.binding_constraints
            .iter()
            .flat_map(BindingLimit::constraint_ids)
            .collect()
    }
}

// ============================================================================
// Scenarios
// ============================================================================

/// An existing allocation evaluated under another snapshot's prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPerformance {
    pub snapshot_id: String,
    pub economics: EconomicSummary,
}

/// Result of repricing against one snapshot in a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub snapshot_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<ScenarioPerformance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScenarioOutcome {
    pub fn roi_percent(&self) -> Option<f64> {
        self.performance.as_ref().and_then(|p| p.economics.roi_percent)
    }
}

/// Stored plan versus a fresh optimization under alternate prices.
///
/// Changes are signed `recomputed - repriced`, so a positive value means
/// re-optimizing would earn more than keeping the stored plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDelta {
    pub strategy_id: StrategyId,
    pub base: AllocationResult,
    pub alternate_snapshot_id: String,
    /// Stored allocation under the alternate prices
    pub repriced: ScenarioPerformance,
    /// Fresh optimization under the alternate prices
    pub recomputed: AllocationResult,
    pub net_revenue_change: f64,
    pub net_return_change: f64,
    /// Percentage points; `None` if either side has zero cost
    pub roi_change: Option<f64>,
    pub reoptimize_recommended: bool,
}

// ============================================================================
// Persisted records
// ============================================================================

/// Opaque strategy identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyId(Uuid);

impl StrategyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StrategyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for StrategyId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One optimization run as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub strategy_id: StrategyId,
    pub created_at: DateTime<Utc>,
    pub request: OptimizationRequest,
    pub result: AllocationResult,
}

/// One scenario comparison as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub strategy_id: StrategyId,
    pub created_at: DateTime<Utc>,
    pub delta: ScenarioDelta,
}

/// Raised when new prices make a stored strategy materially suboptimal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReoptimizationAlert {
    pub strategy_id: StrategyId,
    pub field_id: String,
    pub crop_id: String,
    pub snapshot_id: String,
    pub roi_change: Option<f64>,
    pub net_return_change: f64,
}

/// Point in a field's strategy history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub strategy_id: StrategyId,
    pub created_at: DateTime<Utc>,
    pub snapshot_id: String,
    pub total_cost: f64,
    pub net_return: f64,
    pub roi_percent: Option<f64>,
}
