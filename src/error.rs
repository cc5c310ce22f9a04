/// Validation failures raised before an optimization run starts.
///
/// Conditions local to a single parameter combination (no crossovers, an empty
/// forward window, NaN warm-up values) are not errors; they only exclude that
/// combination from the results.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptimizerError {
    #[error("invalid {name} range: min {min} is greater than max {max}")]
    InvalidRange {
        name: &'static str,
        min: usize,
        max: usize,
    },

    #[error("invalid {name} period {value}: EMA periods must be at least {minimum}")]
    InvalidPeriod {
        name: &'static str,
        value: usize,
        minimum: usize,
    },

    #[error("invalid {name} period {value}: EMA periods must be at most {maximum}")]
    PeriodTooLarge {
        name: &'static str,
        value: usize,
        maximum: usize,
    },

    #[error("parameter grid has no combination with fast < slow (fast {fast_min}-{fast_max}, slow {slow_min}-{slow_max})")]
    EmptyGrid {
        fast_min: usize,
        fast_max: usize,
        slow_min: usize,
        slow_max: usize,
    },

    #[error("price series is empty")]
    EmptySeries,

    #[error("insufficient data: have {bars} bars, need at least {minimum}")]
    InsufficientData { bars: usize, minimum: usize },

    #[error("row {row}: cannot parse date '{value}'")]
    InvalidDate { row: usize, value: String },

    #[error("row {row}: cannot parse close price '{value}'")]
    InvalidClose { row: usize, value: String },

    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_values() {
        let err = OptimizerError::InvalidRange {
            name: "fast",
            min: 20,
            max: 12,
        };
        assert_eq!(
            err.to_string(),
            "invalid fast range: min 20 is greater than max 12"
        );

        let err = OptimizerError::EmptyGrid {
            fast_min: 10,
            fast_max: 10,
            slow_min: 5,
            slow_max: 5,
        };
        assert!(err.to_string().contains("fast < slow"));
    }
}
