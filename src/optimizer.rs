use crate::backtester::simulate_trades;
use crate::config::{BacktestConfig, OptimizerSettings};
use crate::error::OptimizerError;
use crate::indicators::{calculate_macd, calculate_signal_line, EmaCache, MacdSeries};
use crate::market_data::PriceSeries;
use crate::models::{OptimizationReport, ParameterTriple, ProgressEvent, Trade};
use crate::optimizer_status::{CancellationToken, ProgressObserver};
use crate::param_grid::{MAX_EMA_PERIOD, MIN_EMA_PERIOD};
use crate::performance::{Leaderboard, PerformanceCalculator, ScoreOutcome};
use crate::signals::bullish_crossovers;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use std::thread;
use std::time::Instant;

/// Minimum series length for a crossover (which needs a predecessor bar).
pub const MIN_SERIES_BARS: usize = 2;

struct PairTask {
    pair_index: usize,
    fast: usize,
    slow: usize,
}

struct CombinationMsg {
    params: ParameterTriple,
    outcome: ScoreOutcome,
}

#[derive(Default)]
struct RejectionCounts {
    no_trades: usize,
    too_few_trades: usize,
    below_accuracy: usize,
}

impl RejectionCounts {
    fn record(&mut self, outcome: &ScoreOutcome) {
        match outcome {
            ScoreOutcome::Accepted(_) => {}
            ScoreOutcome::NoTrades => self.no_trades += 1,
            ScoreOutcome::TooFewTrades { .. } => self.too_few_trades += 1,
            ScoreOutcome::BelowAccuracy { .. } => self.below_accuracy += 1,
        }
    }
}

/// Scores one `(fast, slow, signal)` triple against a MACD line that was built
/// once for its `(fast, slow)` pair.
pub fn evaluate_combination(
    series: &PriceSeries,
    macd_line: &[f64],
    params: ParameterTriple,
    ordinal: usize,
    config: &BacktestConfig,
) -> ScoreOutcome {
    let signal_line = calculate_signal_line(macd_line, params.signal, config.ema_seeding);
    let entries: Vec<usize> = bullish_crossovers(macd_line, &signal_line).collect();

    if let Some(min_trades) = config.min_trades {
        if entries.len() < min_trades {
            return ScoreOutcome::TooFewTrades {
                total_trades: entries.len(),
                min_trades,
            };
        }
    }

    let trades = simulate_trades(series, entries, config.rule());
    PerformanceCalculator::score(params, ordinal, trades, config.thresholds())
}

/// Full detail for a single parameter triple, including rejected ones.
#[derive(Debug, Clone)]
pub struct CombinationBacktest {
    pub params: ParameterTriple,
    pub macd: MacdSeries,
    pub trades: Vec<Trade>,
    pub outcome: ScoreOutcome,
}

pub fn validate_params(params: ParameterTriple) -> Result<(), OptimizerError> {
    for (name, value) in [
        ("fast", params.fast),
        ("slow", params.slow),
        ("signal", params.signal),
    ] {
        if value < MIN_EMA_PERIOD {
            return Err(OptimizerError::InvalidPeriod {
                name,
                value,
                minimum: MIN_EMA_PERIOD,
            });
        }
        if value > MAX_EMA_PERIOD {
            return Err(OptimizerError::PeriodTooLarge {
                name,
                value,
                maximum: MAX_EMA_PERIOD,
            });
        }
    }
    if params.fast >= params.slow {
        return Err(OptimizerError::EmptyGrid {
            fast_min: params.fast,
            fast_max: params.fast,
            slow_min: params.slow,
            slow_max: params.slow,
        });
    }
    Ok(())
}

pub fn backtest_combination(
    series: &PriceSeries,
    params: ParameterTriple,
    config: &BacktestConfig,
) -> Result<CombinationBacktest, OptimizerError> {
    validate_params(params)?;
    config.validate()?;
    ensure_series_length(series)?;

    let macd = calculate_macd(
        series.closes(),
        params.fast,
        params.slow,
        params.signal,
        config.ema_seeding,
    );
    let entries = bullish_crossovers(&macd.macd_line, &macd.signal_line);
    let trades = simulate_trades(series, entries, config.rule());
    let outcome = PerformanceCalculator::score(params, 0, trades.clone(), config.thresholds());

    Ok(CombinationBacktest {
        params,
        macd,
        trades,
        outcome,
    })
}

fn ensure_series_length(series: &PriceSeries) -> Result<(), OptimizerError> {
    if series.len() < MIN_SERIES_BARS {
        return Err(OptimizerError::InsufficientData {
            bars: series.len(),
            minimum: MIN_SERIES_BARS,
        });
    }
    Ok(())
}

/// Grid search over `(fast, slow, signal)` triples.
///
/// Worker threads pull `(fast, slow)` pairs, build the MACD line once per pair
/// from a shared EMA cache and score every signal period against it. The
/// calling thread collects outcomes, reports progress and keeps the ranking.
pub struct OptimizationEngine<'a> {
    series: &'a PriceSeries,
    settings: &'a OptimizerSettings,
    cancellation: CancellationToken,
}

impl<'a> OptimizationEngine<'a> {
    pub fn new(series: &'a PriceSeries, settings: &'a OptimizerSettings) -> Self {
        Self {
            series,
            settings,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    fn worker_count(&self, pair_count: usize) -> usize {
        let requested = self
            .settings
            .worker_threads
            .unwrap_or_else(num_cpus::get)
            .max(1);
        std::cmp::min(pair_count, requested).max(1)
    }

    pub fn run(&self, observer: &dyn ProgressObserver) -> Result<OptimizationReport, OptimizerError> {
        let settings = self.settings;
        let grid = &settings.grid;
        let config = settings.backtest;
        config.validate()?;
        ensure_series_length(self.series)?;

        let total = grid.combination_count();
        let pairs = grid.fast_slow_pairs();
        let signal_count = grid.signal().len();
        let started = Instant::now();
        info!(
            "Evaluating {} combinations ({} fast/slow pairs x {} signal periods) over {} bars",
            total,
            pairs.len(),
            signal_count,
            self.series.len()
        );

        observer.on_phase("Precomputing EMAs");
        let cache = EmaCache::new(self.series.closes(), config.ema_seeding);
        let periods = grid.price_periods();
        cache.warm(&periods);
        debug!(
            "Cached {} price EMAs ({} seeding)",
            cache.cached_periods(),
            config.ema_seeding.label()
        );

        let num_workers = self.worker_count(pairs.len());
        info!("Using {} worker threads", num_workers);
        observer.on_phase("Scanning parameter grid");

        let (task_tx, task_rx): (Sender<PairTask>, Receiver<PairTask>) = bounded(pairs.len());
        let (result_tx, result_rx): (Sender<CombinationMsg>, Receiver<CombinationMsg>) =
            bounded(num_workers * signal_count.max(1));

        let mut leaderboard = Leaderboard::new(settings.top_n);
        let mut rejections = RejectionCounts::default();
        let mut attempted = 0usize;
        let mut accepted = 0usize;

        thread::scope(|scope| {
            for _ in 0..num_workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let cache = &cache;
                let cancellation = &self.cancellation;
                let series = self.series;

                scope.spawn(move || {
                    'tasks: while let Ok(task) = task_rx.recv() {
                        if cancellation.is_cancelled() {
                            break;
                        }
                        let macd_line = cache.macd_line(task.fast, task.slow);
                        let ordinal_base = grid.pair_ordinal_base(task.pair_index);

                        for (offset, signal) in grid.signal_periods().enumerate() {
                            if cancellation.is_cancelled() {
                                break 'tasks;
                            }
                            let params = ParameterTriple::new(task.fast, task.slow, signal);
                            let outcome = evaluate_combination(
                                series,
                                &macd_line,
                                params,
                                ordinal_base + offset,
                                &config,
                            );
                            if result_tx.send(CombinationMsg { params, outcome }).is_err() {
                                break 'tasks;
                            }
                        }
                        debug!("Finished pair fast={} slow={}", task.fast, task.slow);
                    }
                });
            }
            drop(task_rx);
            drop(result_tx);

            for (pair_index, &(fast, slow)) in pairs.iter().enumerate() {
                // Capacity covers every pair, so this never blocks.
                if task_tx
                    .send(PairTask {
                        pair_index,
                        fast,
                        slow,
                    })
                    .is_err()
                {
                    break;
                }
            }
            drop(task_tx);

            for message in result_rx.iter() {
                attempted += 1;
                rejections.record(&message.outcome);
                if let Some(result) = message.outcome.accepted() {
                    accepted += 1;
                    leaderboard.offer(result);
                }

                observer.on_progress(&ProgressEvent {
                    params: message.params,
                    attempted,
                    accepted,
                    total,
                    best_accuracy: leaderboard.best_accuracy(),
                });
            }
        });

        let completed = attempted == total;
        let best_accuracy = leaderboard.best_accuracy();
        let elapsed = started.elapsed();
        if completed {
            observer.on_phase("Completed");
            info!(
                "Optimization complete: checked {} combinations, {} accepted, best accuracy {} in {:.1}s",
                attempted,
                accepted,
                format_accuracy(best_accuracy),
                elapsed.as_secs_f64()
            );
        } else {
            observer.on_phase("Cancelled");
            warn!(
                "Optimization cancelled after {}/{} combinations ({} accepted) in {:.1}s",
                attempted,
                total,
                accepted,
                elapsed.as_secs_f64()
            );
        }
        debug!(
            "Rejected: {} without trades, {} below min trades, {} below min accuracy",
            rejections.no_trades, rejections.too_few_trades, rejections.below_accuracy
        );

        Ok(OptimizationReport {
            top_results: leaderboard.into_ranked(),
            total_combinations: total,
            evaluated: attempted,
            accepted,
            best_accuracy,
            completed,
        })
    }
}

fn format_accuracy(accuracy: Option<f64>) -> String {
    accuracy
        .map(|value| format!("{:.2}%", value))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Headless convenience wrapper around [`OptimizationEngine`].
pub fn run_optimization(
    series: &PriceSeries,
    settings: &OptimizerSettings,
    observer: &dyn ProgressObserver,
    cancellation: CancellationToken,
) -> Result<OptimizationReport, OptimizerError> {
    OptimizationEngine::new(series, settings)
        .with_cancellation(cancellation)
        .run(observer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::EmaSeeding;
    use crate::optimizer_status::NoProgress;
    use crate::param_grid::{ParameterGrid, PeriodRange};
    use chrono::{Duration, TimeZone, Utc};
    use std::cell::RefCell;

    fn wave_series(len: usize) -> PriceSeries {
        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        PriceSeries::from_pairs((0..len).map(|i| {
            let t = i as f64;
            (
                base + Duration::days(i as i64),
                100.0 + 8.0 * (t / 9.0).sin() + 3.0 * (t / 2.3).cos() + t * 0.05,
            )
        }))
        .unwrap()
    }

    fn settings(grid: ParameterGrid, workers: usize) -> OptimizerSettings {
        let mut settings = OptimizerSettings::new(
            grid,
            BacktestConfig {
                target_pct: 2.0,
                max_days: 8,
                min_trades: Some(1),
                min_accuracy: None,
                ema_seeding: EmaSeeding::FirstValue,
            },
        );
        settings.worker_threads = Some(workers);
        settings
    }

    fn small_grid() -> ParameterGrid {
        ParameterGrid::new(
            PeriodRange::new(3, 6),
            PeriodRange::new(5, 12),
            PeriodRange::new(2, 6),
        )
        .unwrap()
    }

    #[test]
    fn evaluates_every_combination_and_reports_progress() {
        let series = wave_series(300);
        let settings = settings(small_grid(), 3);
        let events = RefCell::new(Vec::new());
        let observer = |event: &ProgressEvent| events.borrow_mut().push(*event);

        let report = OptimizationEngine::new(&series, &settings)
            .run(&observer)
            .unwrap();

        assert!(report.completed);
        assert_eq!(report.evaluated, settings.grid.combination_count());
        let events = events.into_inner();
        assert_eq!(events.len(), report.evaluated);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.attempted, i + 1);
            assert_eq!(event.total, report.total_combinations);
        }
        assert_eq!(events.last().map(|e| e.accepted), Some(report.accepted));
        assert!(report.top_results.len() <= settings.top_n);
    }

    #[test]
    fn ranking_is_independent_of_worker_count() {
        let series = wave_series(400);
        let single = OptimizationEngine::new(&series, &settings(small_grid(), 1))
            .run(&NoProgress)
            .unwrap();
        let parallel = OptimizationEngine::new(&series, &settings(small_grid(), 4))
            .run(&NoProgress)
            .unwrap();
        assert_eq!(single, parallel);
        assert!(!single.top_results.is_empty());
        for pair in single.top_results.windows(2) {
            assert!(
                pair[0].accuracy_pct > pair[1].accuracy_pct
                    || (pair[0].accuracy_pct == pair[1].accuracy_pct
                        && pair[0].ordinal < pair[1].ordinal)
            );
        }
    }

    #[test]
    fn optimizer_matches_single_backtest() {
        let series = wave_series(300);
        let settings = settings(small_grid(), 2);
        let report = OptimizationEngine::new(&series, &settings)
            .run(&NoProgress)
            .unwrap();
        let best = &report.top_results[0];
        let single = backtest_combination(&series, best.params, &settings.backtest).unwrap();
        assert_eq!(single.trades, best.trades);
    }

    #[test]
    fn cancelled_before_start_returns_partial_report() {
        let series = wave_series(200);
        let settings = settings(small_grid(), 2);
        let token = CancellationToken::new();
        token.cancel();
        let report = run_optimization(&series, &settings, &NoProgress, token).unwrap();
        assert!(report.is_partial());
        assert_eq!(report.evaluated, 0);
        assert!(report.top_results.is_empty());
    }

    #[test]
    fn cancelling_from_the_observer_stops_between_combinations() {
        let series = wave_series(300);
        let settings = settings(small_grid(), 1);
        let engine = OptimizationEngine::new(&series, &settings);
        let token = engine.cancellation_token();
        let observer = move |event: &ProgressEvent| {
            if event.attempted == 5 {
                token.cancel();
            }
        };
        let report = engine.run(&observer).unwrap();
        assert!(!report.completed);
        assert!(report.evaluated >= 5);
        assert!(report.evaluated < report.total_combinations);
    }

    #[test]
    fn rejects_series_with_a_single_bar() {
        let series = wave_series(1);
        let settings = settings(small_grid(), 1);
        let err = OptimizationEngine::new(&series, &settings)
            .run(&NoProgress)
            .unwrap_err();
        assert_eq!(
            err,
            OptimizerError::InsufficientData {
                bars: 1,
                minimum: MIN_SERIES_BARS
            }
        );
    }

    #[test]
    fn single_backtest_rejects_oversized_period() {
        let series = wave_series(50);
        let err = backtest_combination(
            &series,
            ParameterTriple::new(12, usize::MAX, 9),
            &BacktestConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, OptimizerError::PeriodTooLarge { name: "slow", .. }));
    }

    #[test]
    fn single_backtest_rejects_fast_not_below_slow() {
        let series = wave_series(50);
        let err = backtest_combination(
            &series,
            ParameterTriple::new(26, 12, 9),
            &BacktestConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, OptimizerError::EmptyGrid { .. }));
    }
}
