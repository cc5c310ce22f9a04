use dashmap::DashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// How the first defined EMA value is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmaSeeding {
    /// `ema[0] = x[0]`, recursive from there; the first `period - 1` values
    /// are reported as NaN.
    #[default]
    FirstValue,
    /// `ema[period - 1]` is the simple average of the first `period` values.
    SimpleAverage,
}

impl EmaSeeding {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "first" | "first_value" | "recursive" => Some(Self::FirstValue),
            "sma" | "simple_average" => Some(Self::SimpleAverage),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::FirstValue => "first_value",
            Self::SimpleAverage => "simple_average",
        }
    }
}

/// Exponential moving average with smoothing factor `2 / (period + 1)`,
/// updated as `ema += alpha * (x - ema)` so a constant input stays exact.
///
/// The output always has the same length as `values`. A leading run of NaN
/// values (an upstream indicator still warming up) is skipped and the EMA is
/// seeded at the first finite value.
pub fn calculate_ema(values: &[f64], period: usize, seeding: EmaSeeding) -> Vec<f64> {
    let mut ema_values = vec![f64::NAN; values.len()];
    if values.is_empty() || period == 0 {
        return ema_values;
    }

    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return ema_values;
    };
    let warmup_end = start + period - 1;
    if warmup_end >= values.len() {
        return ema_values;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    match seeding {
        EmaSeeding::FirstValue => {
            let mut ema = values[start];
            for i in (start + 1)..values.len() {
                ema += multiplier * (values[i] - ema);
                if i >= warmup_end {
                    ema_values[i] = ema;
                }
            }
            if period == 1 {
                ema_values[start] = values[start];
            }
        }
        EmaSeeding::SimpleAverage => {
            let mut ema = values[start..=warmup_end].iter().sum::<f64>() / period as f64;
            ema_values[warmup_end] = ema;
            for i in (warmup_end + 1)..values.len() {
                ema += multiplier * (values[i] - ema);
                ema_values[i] = ema;
            }
        }
    }

    ema_values
}

/// `fast_ema - slow_ema`, element by element.
pub fn calculate_macd_line(fast_ema: &[f64], slow_ema: &[f64]) -> Vec<f64> {
    fast_ema
        .iter()
        .zip(slow_ema)
        .map(|(fast, slow)| fast - slow)
        .collect()
}

/// Signal line: the EMA of the MACD line itself.
pub fn calculate_signal_line(macd_line: &[f64], period: usize, seeding: EmaSeeding) -> Vec<f64> {
    calculate_ema(macd_line, period, seeding)
}

pub fn calculate_macd(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
    seeding: EmaSeeding,
) -> MacdSeries {
    let fast_ema = calculate_ema(prices, fast_period, seeding);
    let slow_ema = calculate_ema(prices, slow_period, seeding);
    let macd_line: Arc<[f64]> = calculate_macd_line(&fast_ema, &slow_ema).into();
    let signal_line = calculate_signal_line(&macd_line, signal_period, seeding);
    MacdSeries {
        macd_line,
        signal_line,
    }
}

/// MACD and signal lines aligned index-for-index with the price series.
#[derive(Debug, Clone)]
pub struct MacdSeries {
    pub macd_line: Arc<[f64]>,
    pub signal_line: Vec<f64>,
}

/// Price EMAs keyed by period, each computed at most once per run.
///
/// Workers share one cache for the whole grid so a `(fast, slow)` pair never
/// recomputes an EMA, no matter how many signal periods are tested against it.
pub struct EmaCache {
    prices: Arc<[f64]>,
    seeding: EmaSeeding,
    per_period: DashMap<usize, Arc<[f64]>>,
    computations: AtomicUsize,
}

impl EmaCache {
    pub fn new(prices: &[f64], seeding: EmaSeeding) -> Self {
        Self {
            prices: prices.into(),
            seeding,
            per_period: DashMap::new(),
            computations: AtomicUsize::new(0),
        }
    }

    pub fn seeding(&self) -> EmaSeeding {
        self.seeding
    }

    pub fn ema(&self, period: usize) -> Arc<[f64]> {
        if let Some(existing) = self.per_period.get(&period) {
            return existing.clone();
        }
        self.per_period
            .entry(period)
            .or_insert_with(|| {
                self.computations.fetch_add(1, Ordering::Relaxed);
                calculate_ema(&self.prices, period, self.seeding).into()
            })
            .clone()
    }

    /// Computes every missing period in parallel.
    pub fn warm(&self, periods: &[usize]) {
        periods.par_iter().for_each(|&period| {
            self.ema(period);
        });
    }

    /// MACD line for a `(fast, slow)` pair, built from cached EMAs.
    pub fn macd_line(&self, fast: usize, slow: usize) -> Arc<[f64]> {
        let fast_ema = self.ema(fast);
        let slow_ema = self.ema(slow);
        calculate_macd_line(&fast_ema, &slow_ema).into()
    }

    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn cached_periods(&self) -> usize {
        self.per_period.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn ema_keeps_input_length() {
        let prices: Vec<f64> = (1..=40).map(f64::from).collect();
        for period in [2, 3, 12, 26, 40, 41, 100] {
            for seeding in [EmaSeeding::FirstValue, EmaSeeding::SimpleAverage] {
                assert_eq!(calculate_ema(&prices, period, seeding).len(), prices.len());
            }
        }
        assert!(calculate_ema(&[], 5, EmaSeeding::FirstValue).is_empty());
    }

    #[test]
    fn first_value_seeding_masks_warmup() {
        let prices = [10.0, 11.0, 12.0, 13.0];
        let ema = calculate_ema(&prices, 3, EmaSeeding::FirstValue);
        assert!(ema[0].is_nan());
        assert!(ema[1].is_nan());
        // alpha = 0.5: 10 -> 10.5 -> 11.25 -> 12.125
        assert_close(ema[2], 11.25);
        assert_close(ema[3], 12.125);
    }

    #[test]
    fn simple_average_seeding_starts_from_mean() {
        let prices = [10.0, 11.0, 12.0, 13.0];
        let ema = calculate_ema(&prices, 3, EmaSeeding::SimpleAverage);
        assert!(ema[1].is_nan());
        assert_close(ema[2], 11.0);
        assert_close(ema[3], 12.0);
    }

    #[test]
    fn ema_seeds_after_leading_nan_prefix() {
        let values = [f64::NAN, f64::NAN, 4.0, 6.0, 8.0];
        let ema = calculate_ema(&values, 2, EmaSeeding::FirstValue);
        assert!(ema[..3].iter().all(|v| v.is_nan()));
        // alpha = 2/3: 4 -> 5.333.. -> 7.111..
        assert_close(ema[3], 4.0 / 3.0 + 4.0);
        assert_close(ema[4], ema[3] + 2.0 / 3.0 * (8.0 - ema[3]));
    }

    #[test]
    fn series_shorter_than_period_is_all_nan() {
        let ema = calculate_ema(&[1.0, 2.0], 5, EmaSeeding::FirstValue);
        assert!(ema.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn flat_prices_give_zero_macd() {
        let prices = vec![50.0; 60];
        let macd = calculate_macd(&prices, 12, 26, 9, EmaSeeding::FirstValue);
        for value in macd.macd_line[25..].iter() {
            assert_eq!(*value, 0.0);
        }
        for value in macd.signal_line[33..].iter() {
            assert_eq!(*value, 0.0);
        }
        assert!(macd.signal_line[32].is_nan());
    }

    #[test]
    fn cache_computes_each_period_once() {
        let prices: Vec<f64> = (0..200).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let cache = EmaCache::new(&prices, EmaSeeding::FirstValue);
        cache.warm(&[12, 26, 12, 30]);
        assert_eq!(cache.computations(), 3);

        let first = cache.ema(12);
        let second = cache.ema(12);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.computations(), 3);
    }

    #[test]
    fn cached_macd_line_matches_direct_calculation() {
        let prices: Vec<f64> = (0..120).map(|i| 20.0 + (i as f64 * 0.2).cos()).collect();
        let cache = EmaCache::new(&prices, EmaSeeding::FirstValue);
        let direct = calculate_macd(&prices, 5, 13, 4, EmaSeeding::FirstValue);
        let cached = cache.macd_line(5, 13);
        for (a, b) in direct.macd_line.iter().zip(cached.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}
