use crate::config::OptimizerSettings;
use crate::market_data::load_price_csv;
use crate::models::{OptimizationReport, ProgressEvent};
use crate::optimizer::OptimizationEngine;
use crate::optimizer_status::{CancellationToken, ProgressObserver};
use crate::report;
use anyhow::Result;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Where the results of an optimize run are written.
#[derive(Debug, Clone, Default)]
pub struct OptimizeOutputs {
    pub ranking_csv: Option<PathBuf>,
    pub trades_dir: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

struct ProgressBarObserver {
    bar: ProgressBar,
}

impl ProgressBarObserver {
    fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        self.bar.set_position(event.attempted as u64);
        let best = event
            .best_accuracy
            .map(|value| format!("{:.2}%", value))
            .unwrap_or_else(|| "-".to_string());
        self.bar.set_message(format!(
            "{} | accepted {} | best {}",
            event.params, event.accepted, best
        ));
    }

    fn on_phase(&self, phase: &str) {
        self.bar.set_prefix(phase.to_string());
    }
}

/// Cancels `token` once `limit` elapses unless the returned sender is
/// dropped first.
fn spawn_time_limit(token: CancellationToken, limit: Duration) -> Sender<()> {
    let (done_tx, done_rx) = bounded::<()>(1);
    thread::spawn(move || match done_rx.recv_timeout(limit) {
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                "Time limit of {}s reached, cancelling optimization",
                limit.as_secs()
            );
            token.cancel();
        }
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
    });
    done_tx
}

pub fn run(
    data_file: &Path,
    settings: &OptimizerSettings,
    outputs: &OptimizeOutputs,
    time_limit: Option<Duration>,
) -> Result<OptimizationReport> {
    let series = load_price_csv(data_file)?;
    info!(
        "Grid fast {}-{} slow {}-{} signal {}-{}; target {:.2}% within {} bars",
        settings.grid.fast().min,
        settings.grid.fast().max,
        settings.grid.slow().min,
        settings.grid.slow().max,
        settings.grid.signal().min,
        settings.grid.signal().max,
        settings.backtest.target_pct,
        settings.backtest.max_days
    );

    let engine = OptimizationEngine::new(&series, settings);
    let watchdog = time_limit.map(|limit| spawn_time_limit(engine.cancellation_token(), limit));

    let observer = ProgressBarObserver::new(settings.grid.combination_count());
    let result = engine.run(&observer);
    observer.finish();
    drop(watchdog);
    let report = result?;

    report::print_summary(&report);
    if let Some(path) = &outputs.ranking_csv {
        report::export_ranking(path, &report)?;
    }
    if let Some(dir) = &outputs.trades_dir {
        report::export_trade_logs(dir, &report.top_results)?;
    }
    if let Some(path) = &outputs.json {
        report::export_json(path, &report)?;
    }
    Ok(report)
}
