use crate::models::{CombinationResult, ParameterTriple, Trade};
use statrs::statistics::Statistics;
use std::cmp::Ordering;

/// Optional acceptance filters. `None` disables the filter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreThresholds {
    pub min_trades: Option<usize>,
    pub min_accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Accepted(CombinationResult),
    NoTrades,
    TooFewTrades {
        total_trades: usize,
        min_trades: usize,
    },
    BelowAccuracy {
        accuracy_pct: f64,
        min_accuracy: f64,
    },
}

impl ScoreOutcome {
    pub fn accepted(self) -> Option<CombinationResult> {
        match self {
            ScoreOutcome::Accepted(result) => Some(result),
            _ => None,
        }
    }
}

pub fn accuracy_pct(hits: usize, total_trades: usize) -> f64 {
    100.0 * hits as f64 / total_trades as f64
}

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Scores the trade log of one parameter triple.
    ///
    /// Every trade counts in the denominator, including forced exits at the
    /// horizon and an entry on the final bar.
    pub fn score(
        params: ParameterTriple,
        ordinal: usize,
        trades: Vec<Trade>,
        thresholds: ScoreThresholds,
    ) -> ScoreOutcome {
        let total_trades = trades.len();
        if let Some(min_trades) = thresholds.min_trades {
            if total_trades < min_trades {
                return ScoreOutcome::TooFewTrades {
                    total_trades,
                    min_trades,
                };
            }
        }
        if total_trades == 0 {
            return ScoreOutcome::NoTrades;
        }

        let hits = trades.iter().filter(|trade| trade.target_hit).count();
        let accuracy = accuracy_pct(hits, total_trades);
        if let Some(min_accuracy) = thresholds.min_accuracy {
            if accuracy < min_accuracy {
                return ScoreOutcome::BelowAccuracy {
                    accuracy_pct: accuracy,
                    min_accuracy,
                };
            }
        }

        let returns: Vec<f64> = trades.iter().map(|trade| trade.pct_return).collect();
        let bars_held: Vec<f64> = trades
            .iter()
            .map(|trade| trade.bars_held() as f64)
            .collect();

        ScoreOutcome::Accepted(CombinationResult {
            params,
            total_trades,
            hits,
            accuracy_pct: accuracy,
            avg_return_pct: Self::average(&returns),
            median_return_pct: Self::median(&returns),
            avg_bars_held: Self::average(&bars_held),
            ordinal,
            trades,
        })
    }

    fn average(values: &[f64]) -> f64 {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return 0.0;
        }
        finite.mean()
    }

    fn median(values: &[f64]) -> f64 {
        let mut filtered: Vec<f64> = values
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .collect();

        if filtered.is_empty() {
            return 0.0;
        }

        filtered.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mid = filtered.len() / 2;

        if filtered.len() % 2 == 0 {
            (filtered[mid - 1] + filtered[mid]) / 2.0
        } else {
            filtered[mid]
        }
    }
}

/// Accuracy descending, then grid enumeration order.
pub fn compare_ranking(a: &CombinationResult, b: &CombinationResult) -> Ordering {
    b.accuracy_pct
        .total_cmp(&a.accuracy_pct)
        .then_with(|| a.ordinal.cmp(&b.ordinal))
}

pub fn rank_results(mut results: Vec<CombinationResult>, top_n: usize) -> Vec<CombinationResult> {
    results.sort_by(compare_ranking);
    results.truncate(top_n);
    results
}

/// Keeps the best `capacity` results seen so far in ranking order.
///
/// The ranking key is a total order, so the final board does not depend on the
/// order results arrive in.
#[derive(Debug, Clone)]
pub struct Leaderboard {
    capacity: usize,
    entries: Vec<CombinationResult>,
    best_accuracy: Option<f64>,
}

impl Leaderboard {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
            best_accuracy: None,
        }
    }

    pub fn offer(&mut self, result: CombinationResult) {
        self.best_accuracy = Some(match self.best_accuracy {
            Some(best) => best.max(result.accuracy_pct),
            None => result.accuracy_pct,
        });

        let position = self
            .entries
            .partition_point(|entry| compare_ranking(entry, &result) == Ordering::Less);
        if position >= self.capacity {
            return;
        }
        self.entries.insert(position, result);
        self.entries.truncate(self.capacity);
    }

    pub fn best_accuracy(&self) -> Option<f64> {
        self.best_accuracy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_ranked(self) -> Vec<CombinationResult> {
        self.entries
    }
}
