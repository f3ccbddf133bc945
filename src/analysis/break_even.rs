//! ROI and break-even arithmetic

use crate::types::EconomicSummary;

/// Economics of spending `total_cost` for `yield_delta` sold at
/// `commodity_price`.
///
/// Ratios with a zero denominator are `None` rather than infinite.
pub fn summarize(total_cost: f64, yield_delta: f64, commodity_price: f64) -> EconomicSummary {
    let net_revenue_delta = yield_delta * commodity_price;
    let net_return = net_revenue_delta - total_cost;

    let roi_percent = (total_cost > 0.0).then(|| net_return / total_cost * 100.0);
    let break_even_price = (yield_delta > 0.0).then(|| total_cost / yield_delta);
    let break_even_yield =
        (total_cost > 0.0 && commodity_price > 0.0).then(|| total_cost / commodity_price);

    EconomicSummary {
        total_cost,
        yield_delta,
        commodity_price,
        net_revenue_delta,
        net_return,
        roi_percent,
        break_even_price,
        break_even_yield,
    }
}
