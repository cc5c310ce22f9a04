use crate::backtester::TakeProfitRule;
use crate::error::OptimizerError;
use crate::indicators::EmaSeeding;
use crate::param_grid::{ParameterGrid, PeriodRange};
use crate::performance::ScoreThresholds;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_FAST_RANGE: PeriodRange = PeriodRange { min: 12, max: 20 };
pub const DEFAULT_SLOW_RANGE: PeriodRange = PeriodRange { min: 26, max: 40 };
pub const DEFAULT_SIGNAL_RANGE: PeriodRange = PeriodRange { min: 9, max: 15 };
pub const DEFAULT_TARGET_PCT: f64 = 5.0;
pub const DEFAULT_MAX_DAYS: usize = 10;
pub const DEFAULT_TOP_N: usize = 10;

/// Keys understood by [`OptimizerSettings::from_settings_map`].
pub const SETTING_KEYS: [&str; 13] = [
    "FAST_MIN",
    "FAST_MAX",
    "SLOW_MIN",
    "SLOW_MAX",
    "SIGNAL_MIN",
    "SIGNAL_MAX",
    "TARGET_PCT",
    "MAX_DAYS",
    "MIN_TRADES",
    "MIN_ACCURACY",
    "EMA_SEEDING",
    "TOP_N",
    "WORKER_THREADS",
];

/// Per-combination backtest configuration shared by every code path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub target_pct: f64,
    pub max_days: usize,
    pub min_trades: Option<usize>,
    pub min_accuracy: Option<f64>,
    pub ema_seeding: EmaSeeding,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            target_pct: DEFAULT_TARGET_PCT,
            max_days: DEFAULT_MAX_DAYS,
            min_trades: None,
            min_accuracy: None,
            ema_seeding: EmaSeeding::FirstValue,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if !self.target_pct.is_finite() || self.target_pct <= 0.0 {
            return Err(invalid_setting(
                "TARGET_PCT",
                format!("must be a positive number (value: {})", self.target_pct),
            ));
        }
        if self.max_days == 0 {
            return Err(invalid_setting("MAX_DAYS", "must be at least 1".to_string()));
        }
        if let Some(min_trades) = self.min_trades {
            if min_trades == 0 {
                return Err(invalid_setting(
                    "MIN_TRADES",
                    "must be at least 1 when set".to_string(),
                ));
            }
        }
        if let Some(min_accuracy) = self.min_accuracy {
            if !(0.0..=100.0).contains(&min_accuracy) {
                return Err(invalid_setting(
                    "MIN_ACCURACY",
                    format!("must be between 0 and 100 (value: {})", min_accuracy),
                ));
            }
        }
        Ok(())
    }

    pub fn rule(&self) -> TakeProfitRule {
        TakeProfitRule::new(self.target_pct, self.max_days)
    }

    pub fn thresholds(&self) -> ScoreThresholds {
        ScoreThresholds {
            min_trades: self.min_trades,
            min_accuracy: self.min_accuracy,
        }
    }
}

fn invalid_setting(key: &str, reason: String) -> OptimizerError {
    OptimizerError::InvalidSetting {
        key: key.to_string(),
        reason,
    }
}

/// Everything one optimization run needs besides the price series.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerSettings {
    pub grid: ParameterGrid,
    pub backtest: BacktestConfig,
    pub top_n: usize,
    /// `None` uses one worker per logical CPU.
    pub worker_threads: Option<usize>,
}

impl OptimizerSettings {
    pub fn new(grid: ParameterGrid, backtest: BacktestConfig) -> Self {
        Self {
            grid,
            backtest,
            top_n: DEFAULT_TOP_N,
            worker_threads: None,
        }
    }

    /// Builds settings from string key/value pairs. Missing range and rule
    /// keys fall back to the defaults; missing thresholds disable the filter.
    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let fast = PeriodRange::new(
            setting_usize_or(settings, "FAST_MIN", DEFAULT_FAST_RANGE.min)?,
            setting_usize_or(settings, "FAST_MAX", DEFAULT_FAST_RANGE.max)?,
        );
        let slow = PeriodRange::new(
            setting_usize_or(settings, "SLOW_MIN", DEFAULT_SLOW_RANGE.min)?,
            setting_usize_or(settings, "SLOW_MAX", DEFAULT_SLOW_RANGE.max)?,
        );
        let signal = PeriodRange::new(
            setting_usize_or(settings, "SIGNAL_MIN", DEFAULT_SIGNAL_RANGE.min)?,
            setting_usize_or(settings, "SIGNAL_MAX", DEFAULT_SIGNAL_RANGE.max)?,
        );
        let grid = ParameterGrid::new(fast, slow, signal)?;

        let ema_seeding = match optional_setting(settings, "EMA_SEEDING") {
            Some(raw) => EmaSeeding::parse(raw).ok_or_else(|| {
                anyhow!(
                    "Setting EMA_SEEDING must be first_value or simple_average (value: {})",
                    raw
                )
            })?,
            None => EmaSeeding::default(),
        };

        let backtest = BacktestConfig {
            target_pct: optional_setting_f64(settings, "TARGET_PCT")?
                .unwrap_or(DEFAULT_TARGET_PCT),
            max_days: setting_usize_or(settings, "MAX_DAYS", DEFAULT_MAX_DAYS)?,
            min_trades: optional_setting_usize(settings, "MIN_TRADES")?,
            min_accuracy: optional_setting_f64(settings, "MIN_ACCURACY")?,
            ema_seeding,
        };
        backtest.validate()?;

        let top_n = setting_usize_or(settings, "TOP_N", DEFAULT_TOP_N)?;
        if top_n == 0 {
            return Err(anyhow!("Setting TOP_N must be >= 1 (value: 0)"));
        }
        let worker_threads = optional_setting_usize(settings, "WORKER_THREADS")?;
        if worker_threads == Some(0) {
            return Err(anyhow!("Setting WORKER_THREADS must be >= 1 (value: 0)"));
        }

        Ok(Self {
            grid,
            backtest,
            top_n,
            worker_threads,
        })
    }
}

/// Values that explicitly switch an optional filter off.
fn is_disabled_value(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "none" | "off" | "disabled"
    )
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn optional_setting_f64(settings: &HashMap<String, String>, key: &str) -> Result<Option<f64>> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    if is_disabled_value(raw) {
        return Ok(None);
    }
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    Ok(Some(value))
}

fn optional_setting_usize(
    settings: &HashMap<String, String>,
    key: &str,
) -> Result<Option<usize>> {
    let Some(raw) = optional_setting(settings, key) else {
        return Ok(None);
    };
    if is_disabled_value(raw) {
        return Ok(None);
    }
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("Setting {} must be a number (value: {})", key, raw))?;
    if !value.is_finite() {
        return Err(anyhow!("Setting {} must be finite (value: {})", key, raw));
    }
    if value.fract() != 0.0 {
        return Err(anyhow!(
            "Setting {} must be an integer (value: {})",
            key,
            raw
        ));
    }
    if value < 0.0 {
        return Err(anyhow!("Setting {} must be >= 0 (value: {})", key, raw));
    }
    if value > u32::MAX as f64 {
        return Err(anyhow!("Setting {} is too large (value: {})", key, raw));
    }
    Ok(Some(value as usize))
}

fn setting_usize_or(
    settings: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize> {
    Ok(optional_setting_usize(settings, key)?.unwrap_or(default))
}
