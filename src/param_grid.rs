use crate::error::OptimizerError;
use crate::models::ParameterTriple;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

pub const MIN_EMA_PERIOD: usize = 2;
pub const MAX_EMA_PERIOD: usize = 10_000;

/// Inclusive integer range of EMA periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRange {
    pub min: usize,
    pub max: usize,
}

impl PeriodRange {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn single(value: usize) -> Self {
        Self::new(value, value)
    }

    pub fn values(&self) -> RangeInclusive<usize> {
        self.min..=self.max
    }

    pub fn len(&self) -> usize {
        if self.max < self.min {
            0
        } else {
            self.max - self.min + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate(&self, name: &'static str) -> Result<(), OptimizerError> {
        if self.min > self.max {
            return Err(OptimizerError::InvalidRange {
                name,
                min: self.min,
                max: self.max,
            });
        }
        if self.min < MIN_EMA_PERIOD {
            return Err(OptimizerError::InvalidPeriod {
                name,
                value: self.min,
                minimum: MIN_EMA_PERIOD,
            });
        }
        if self.max > MAX_EMA_PERIOD {
            return Err(OptimizerError::PeriodTooLarge {
                name,
                value: self.max,
                maximum: MAX_EMA_PERIOD,
            });
        }
        Ok(())
    }
}

/// Fast, slow and signal ranges; valid combinations satisfy `fast < slow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterGrid {
    fast: PeriodRange,
    slow: PeriodRange,
    signal: PeriodRange,
}

impl ParameterGrid {
    pub fn new(
        fast: PeriodRange,
        slow: PeriodRange,
        signal: PeriodRange,
    ) -> Result<Self, OptimizerError> {
        fast.validate("fast")?;
        slow.validate("slow")?;
        signal.validate("signal")?;

        let grid = Self { fast, slow, signal };
        if grid.pair_count() == 0 {
            return Err(OptimizerError::EmptyGrid {
                fast_min: fast.min,
                fast_max: fast.max,
                slow_min: slow.min,
                slow_max: slow.max,
            });
        }
        Ok(grid)
    }

    pub fn fast(&self) -> PeriodRange {
        self.fast
    }

    pub fn slow(&self) -> PeriodRange {
        self.slow
    }

    pub fn signal(&self) -> PeriodRange {
        self.signal
    }

    fn slow_count_above(&self, fast: usize) -> usize {
        match fast.checked_add(1) {
            Some(above) => {
                let lowest = self.slow.min.max(above);
                if lowest > self.slow.max {
                    0
                } else {
                    self.slow.max - lowest + 1
                }
            }
            None => 0,
        }
    }

    pub fn pair_count(&self) -> usize {
        self.fast
            .values()
            .map(|fast| self.slow_count_above(fast))
            .sum()
    }

    /// Exact number of valid `(fast, slow, signal)` triples.
    pub fn combination_count(&self) -> usize {
        self.pair_count() * self.signal.len()
    }

    /// `(fast, slow)` pairs with `fast < slow`, in lexicographic order.
    pub fn fast_slow_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::with_capacity(self.pair_count());
        for fast in self.fast.values() {
            for slow in self.slow.values() {
                if fast < slow {
                    pairs.push((fast, slow));
                }
            }
        }
        pairs
    }

    pub fn signal_periods(&self) -> RangeInclusive<usize> {
        self.signal.values()
    }

    /// Every valid triple in lexicographic `(fast, slow, signal)` order.
    pub fn combinations(&self) -> impl Iterator<Item = ParameterTriple> + '_ {
        self.fast_slow_pairs().into_iter().flat_map(move |(fast, slow)| {
            self.signal_periods()
                .map(move |signal| ParameterTriple::new(fast, slow, signal))
        })
    }

    /// Ordinal of the first triple of the pair at `pair_index`.
    pub fn pair_ordinal_base(&self, pair_index: usize) -> usize {
        pair_index * self.signal.len()
    }

    /// Distinct price-EMA periods used by at least one valid pair.
    pub fn price_periods(&self) -> Vec<usize> {
        let mut periods = BTreeSet::new();
        for (fast, slow) in self.fast_slow_pairs() {
            periods.insert(fast);
            periods.insert(slow);
        }
        periods.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_only_fast_below_slow() {
        let grid = ParameterGrid::new(
            PeriodRange::new(12, 20),
            PeriodRange::new(15, 18),
            PeriodRange::new(9, 15),
        )
        .unwrap();
        let brute_force = (12..=20)
            .flat_map(|f| (15..=18).map(move |s| (f, s)))
            .filter(|(f, s)| f < s)
            .count();
        assert_eq!(grid.pair_count(), brute_force);
        assert_eq!(grid.combination_count(), brute_force * 7);
        assert_eq!(grid.combinations().count(), grid.combination_count());
    }

    #[test]
    fn combinations_are_lexicographic() {
        let grid = ParameterGrid::new(
            PeriodRange::new(2, 4),
            PeriodRange::new(3, 5),
            PeriodRange::new(2, 3),
        )
        .unwrap();
        let triples: Vec<ParameterTriple> = grid.combinations().collect();
        let mut sorted = triples.clone();
        sorted.sort();
        assert_eq!(triples, sorted);
        assert!(triples.iter().all(|t| t.fast < t.slow));
        assert_eq!(triples[0], ParameterTriple::new(2, 3, 2));
        assert_eq!(grid.pair_ordinal_base(1), 2);
        assert_eq!(triples[2], ParameterTriple::new(2, 4, 2));
    }

    #[test]
    fn single_point_grid_has_one_combination() {
        let grid = ParameterGrid::new(
            PeriodRange::single(12),
            PeriodRange::single(26),
            PeriodRange::single(9),
        )
        .unwrap();
        assert_eq!(grid.combination_count(), 1);
        assert_eq!(grid.price_periods(), vec![12, 26]);
    }

    #[test]
    fn fast_above_slow_is_an_empty_grid() {
        let err = ParameterGrid::new(
            PeriodRange::single(10),
            PeriodRange::single(5),
            PeriodRange::single(9),
        )
        .unwrap_err();
        assert!(matches!(err, OptimizerError::EmptyGrid { .. }));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = ParameterGrid::new(
            PeriodRange::new(20, 12),
            PeriodRange::new(26, 40),
            PeriodRange::new(9, 15),
        )
        .unwrap_err();
        assert_eq!(
            err,
            OptimizerError::InvalidRange {
                name: "fast",
                min: 20,
                max: 12
            }
        );
    }

    #[test]
    fn oversized_periods_are_rejected() {
        let err = ParameterGrid::new(
            PeriodRange::new(12, usize::MAX),
            PeriodRange::new(26, 40),
            PeriodRange::new(9, 15),
        )
        .unwrap_err();
        assert_eq!(
            err,
            OptimizerError::PeriodTooLarge {
                name: "fast",
                value: usize::MAX,
                maximum: MAX_EMA_PERIOD
            }
        );
    }

    #[test]
    fn periods_below_two_are_rejected() {
        let err = ParameterGrid::new(
            PeriodRange::new(1, 5),
            PeriodRange::new(26, 40),
            PeriodRange::new(9, 15),
        )
        .unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidPeriod { value: 1, .. }));
    }
}
