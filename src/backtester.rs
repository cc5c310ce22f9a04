use crate::market_data::PriceSeries;
use crate::models::Trade;

/// Exit rule applied to every entry: take profit at `target_pct` percent above
/// the entry close, or leave after `max_days` bars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TakeProfitRule {
    pub target_pct: f64,
    pub max_days: usize,
}

impl TakeProfitRule {
    pub fn new(target_pct: f64, max_days: usize) -> Self {
        Self {
            target_pct,
            max_days,
        }
    }

    pub fn target_price(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 + self.target_pct / 100.0)
    }
}

/// Percentage move from entry to exit; NaN when the entry price cannot
/// anchor a return.
pub fn percent_return(entry_price: f64, exit_price: f64) -> f64 {
    if !is_tradable_price(entry_price) {
        return f64::NAN;
    }
    (exit_price - entry_price) / entry_price * 100.0
}

fn is_tradable_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Simulates one trade entered at the close of `entry_index`.
///
/// The exit is the first bar in `[entry + 1, min(entry + max_days, last)]`
/// whose close reaches the target, otherwise the last bar of that window.
/// An entry on the final bar has no forward window and exits in place.
/// Entries at a non-positive or non-finite price never hit.
pub fn simulate_trade(series: &PriceSeries, entry_index: usize, rule: TakeProfitRule) -> Trade {
    debug_assert!(entry_index <= series.last_index());
    let closes = series.closes();
    let entry_price = closes[entry_index];
    let window_end = entry_index
        .saturating_add(rule.max_days)
        .min(series.last_index());

    let hit_index = if is_tradable_price(entry_price) {
        let target_price = rule.target_price(entry_price);
        ((entry_index + 1)..=window_end).find(|&i| closes[i] >= target_price)
    } else {
        None
    };
    let exit_index = hit_index.unwrap_or(window_end);
    let exit_price = closes[exit_index];

    Trade {
        entry_index,
        entry_date: series.date(entry_index),
        entry_price,
        exit_index,
        exit_date: series.date(exit_index),
        exit_price,
        pct_return: percent_return(entry_price, exit_price),
        target_hit: hit_index.is_some(),
    }
}

/// One trade per entry, in entry order.
pub fn simulate_trades<I>(series: &PriceSeries, entries: I, rule: TakeProfitRule) -> Vec<Trade>
where
    I: IntoIterator<Item = usize>,
{
    entries
        .into_iter()
        .map(|entry_index| simulate_trade(series, entry_index, rule))
        .collect()
}
