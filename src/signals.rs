/// Lazily yields the indices of strict bullish crossovers, i.e. every `i` with
/// `macd[i-1] < signal[i-1]` and `macd[i] > signal[i]`.
///
/// Equality on either side never qualifies and neither does a comparison
/// against NaN, so warm-up positions are skipped naturally. The scan only
/// borrows the two lines, so a fresh or cloned scan replays the same indices.
#[derive(Debug, Clone)]
pub struct BullishCrossovers<'a> {
    macd_line: &'a [f64],
    signal_line: &'a [f64],
    index: usize,
}

pub fn bullish_crossovers<'a>(macd_line: &'a [f64], signal_line: &'a [f64]) -> BullishCrossovers<'a> {
    debug_assert_eq!(macd_line.len(), signal_line.len());
    BullishCrossovers {
        macd_line,
        signal_line,
        index: 1,
    }
}

pub fn is_bullish_crossover(macd_line: &[f64], signal_line: &[f64], index: usize) -> bool {
    if index == 0 || index >= macd_line.len() || index >= signal_line.len() {
        return false;
    }
    macd_line[index - 1] < signal_line[index - 1] && macd_line[index] > signal_line[index]
}

impl Iterator for BullishCrossovers<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let len = self.macd_line.len().min(self.signal_line.len());
        while self.index < len {
            let index = self.index;
            self.index += 1;
            if is_bullish_crossover(self.macd_line, self.signal_line, index) {
                return Some(index);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.macd_line.len().min(self.signal_line.len());
        (0, Some(len.saturating_sub(self.index)))
    }
}

impl std::iter::FusedIterator for BullishCrossovers<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_strict_crossings_only() {
        let macd = [1.0, 0.0, 2.0, 1.0, 1.0, 3.0, 0.0, 5.0];
        let signal = [0.5, 1.0, 1.0, 1.0, 2.0, 2.0, 1.0, 1.0];
        // i=2: 0<1 && 2>1 -> yes
        // i=4: 1<1 is false (touching from equal) -> no
        // i=5: 1<2 && 3>2 -> yes
        // i=7: 0<1 && 5>1 -> yes
        let found: Vec<usize> = bullish_crossovers(&macd, &signal).collect();
        assert_eq!(found, vec![2, 5, 7]);
    }

    #[test]
    fn equality_at_the_crossing_bar_does_not_count() {
        let macd = [0.0, 1.0, 1.5];
        let signal = [1.0, 1.0, 1.0];
        let found: Vec<usize> = bullish_crossovers(&macd, &signal).collect();
        assert!(found.is_empty());
    }

    #[test]
    fn index_zero_never_qualifies() {
        let macd = [5.0, 6.0];
        let signal = [1.0, 1.0];
        assert!(!is_bullish_crossover(&macd, &signal, 0));
        assert_eq!(bullish_crossovers(&macd, &signal).count(), 0);
    }

    #[test]
    fn nan_values_never_cross() {
        let macd = [f64::NAN, f64::NAN, 1.0, 3.0];
        let signal = [f64::NAN, 0.0, f64::NAN, 2.0];
        assert_eq!(bullish_crossovers(&macd, &signal).count(), 0);
    }

    #[test]
    fn rescanning_yields_the_same_sequence() {
        let macd = [0.0, 2.0, 0.0, 2.0];
        let signal = [1.0, 1.0, 1.0, 1.0];
        let scan = bullish_crossovers(&macd, &signal);
        let first: Vec<usize> = scan.clone().collect();
        let second: Vec<usize> = scan.collect();
        assert_eq!(first, vec![1, 3]);
        assert_eq!(first, second);
    }
}
