use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: DateTime<Utc>,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParameterTriple {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl ParameterTriple {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self { fast, slow, signal }
    }
}

impl fmt::Display for ParameterTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fast={} slow={} signal={}",
            self.fast, self.slow, self.signal
        )
    }
}

/// One simulated take-profit trade opened on a bullish crossover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub entry_index: usize,
    pub entry_date: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_index: usize,
    pub exit_date: DateTime<Utc>,
    pub exit_price: f64,
    pub pct_return: f64,
    pub target_hit: bool,
}

impl Trade {
    pub fn bars_held(&self) -> usize {
        self.exit_index - self.entry_index
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinationResult {
    pub params: ParameterTriple,
    pub total_trades: usize,
    pub hits: usize,
    pub accuracy_pct: f64,
    pub avg_return_pct: f64,
    pub median_return_pct: f64,
    pub avg_bars_held: f64,
    /// Position of `params` in the grid's lexicographic enumeration.
    pub ordinal: usize,
    pub trades: Vec<Trade>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub top_results: Vec<CombinationResult>,
    pub total_combinations: usize,
    pub evaluated: usize,
    pub accepted: usize,
    pub best_accuracy: Option<f64>,
    /// False when the run was cancelled before the grid was exhausted.
    pub completed: bool,
}

impl OptimizationReport {
    pub fn is_partial(&self) -> bool {
        !self.completed
    }
}

/// Emitted by the optimizer after every evaluated combination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub params: ParameterTriple,
    pub attempted: usize,
    pub accepted: usize,
    pub total: usize,
    pub best_accuracy: Option<f64>,
}
