use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use log::info;
use macd_optimizer::{
    commands::{backtest, count, optimize},
    config::{OptimizerSettings, SETTING_KEYS},
    models::ParameterTriple,
};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "MACD_";

#[derive(Parser)]
#[command(name = "macd-optimizer")]
#[command(about = "Grid-search MACD crossover parameters against a take-profit target")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every (fast, slow, signal) combination and rank the best ten
    Optimize {
        /// CSV file with Date and Close columns
        #[arg(long = "data", value_name = "PATH")]
        data: PathBuf,
        #[command(flatten)]
        grid: GridArgs,
        #[command(flatten)]
        backtest: BacktestArgs,
        /// Number of ranked results to keep
        #[arg(long)]
        top_n: Option<usize>,
        /// Worker threads (defaults to the number of logical CPUs)
        #[arg(long)]
        threads: Option<usize>,
        /// Write the ranking table as CSV
        #[arg(short, long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
        /// Write one trade log per ranked combination into this directory
        #[arg(long = "trades-dir", value_name = "DIR")]
        trades_dir: Option<PathBuf>,
        /// Write the full report as JSON
        #[arg(long = "json", value_name = "PATH")]
        json: Option<PathBuf>,
        /// Cancel the run after this many seconds and report partial results
        #[arg(long = "time-limit", value_name = "SECS")]
        time_limit: Option<u64>,
    },
    /// Backtest a single parameter combination and list its trades
    Backtest {
        /// CSV file with Date and Close columns
        #[arg(long = "data", value_name = "PATH")]
        data: PathBuf,
        #[arg(long)]
        fast: usize,
        #[arg(long)]
        slow: usize,
        #[arg(long)]
        signal: usize,
        #[command(flatten)]
        backtest: BacktestArgs,
        /// Write the trade log as CSV
        #[arg(short, long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Print the number of valid combinations in a grid
    Count {
        #[command(flatten)]
        grid: GridArgs,
    },
}

#[derive(Args, Default)]
struct GridArgs {
    #[arg(long)]
    fast_min: Option<usize>,
    #[arg(long)]
    fast_max: Option<usize>,
    #[arg(long)]
    slow_min: Option<usize>,
    #[arg(long)]
    slow_max: Option<usize>,
    #[arg(long)]
    signal_min: Option<usize>,
    #[arg(long)]
    signal_max: Option<usize>,
}

#[derive(Args, Default)]
struct BacktestArgs {
    /// Take-profit target in percent
    #[arg(long)]
    target_pct: Option<f64>,
    /// Forward window in bars
    #[arg(long)]
    max_days: Option<usize>,
    /// Minimum number of trades ("off" disables the filter)
    #[arg(long)]
    min_trades: Option<String>,
    /// Minimum accuracy in percent ("off" disables the filter)
    #[arg(long)]
    min_accuracy: Option<String>,
    /// EMA seeding: first_value or simple_average
    #[arg(long)]
    ema_seeding: Option<String>,
}

fn settings_from_env() -> HashMap<String, String> {
    SETTING_KEYS
        .iter()
        .filter_map(|key| {
            env::var(format!("{}{}", ENV_PREFIX, key))
                .ok()
                .map(|value| (key.to_string(), value))
        })
        .collect()
}

fn insert_setting<T: ToString>(settings: &mut HashMap<String, String>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        settings.insert(key.to_string(), value.to_string());
    }
}

impl GridArgs {
    fn apply(self, settings: &mut HashMap<String, String>) {
        insert_setting(settings, "FAST_MIN", self.fast_min);
        insert_setting(settings, "FAST_MAX", self.fast_max);
        insert_setting(settings, "SLOW_MIN", self.slow_min);
        insert_setting(settings, "SLOW_MAX", self.slow_max);
        insert_setting(settings, "SIGNAL_MIN", self.signal_min);
        insert_setting(settings, "SIGNAL_MAX", self.signal_max);
    }
}

impl BacktestArgs {
    fn apply(self, settings: &mut HashMap<String, String>) {
        insert_setting(settings, "TARGET_PCT", self.target_pct);
        insert_setting(settings, "MAX_DAYS", self.max_days);
        insert_setting(settings, "MIN_TRADES", self.min_trades);
        insert_setting(settings, "MIN_ACCURACY", self.min_accuracy);
        insert_setting(settings, "EMA_SEEDING", self.ema_seeding);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut settings = settings_from_env();
    if !settings.is_empty() {
        info!(
            "Using {} setting(s) from {}* environment variables",
            settings.len(),
            ENV_PREFIX
        );
    }

    match cli.command {
        Commands::Optimize {
            data,
            grid,
            backtest,
            top_n,
            threads,
            output,
            trades_dir,
            json,
            time_limit,
        } => {
            grid.apply(&mut settings);
            backtest.apply(&mut settings);
            insert_setting(&mut settings, "TOP_N", top_n);
            insert_setting(&mut settings, "WORKER_THREADS", threads);
            let settings = OptimizerSettings::from_settings_map(&settings)?;
            let outputs = optimize::OptimizeOutputs {
                ranking_csv: output,
                trades_dir,
                json,
            };
            optimize::run(
                &data,
                &settings,
                &outputs,
                time_limit.map(Duration::from_secs),
            )?;
        }
        Commands::Backtest {
            data,
            fast,
            slow,
            signal,
            backtest: backtest_args,
            output,
        } => {
            backtest_args.apply(&mut settings);
            let settings = OptimizerSettings::from_settings_map(&settings)?;
            backtest::run(
                &data,
                ParameterTriple::new(fast, slow, signal),
                &settings.backtest,
                output.as_deref(),
            )?;
        }
        Commands::Count { grid } => {
            grid.apply(&mut settings);
            let settings = OptimizerSettings::from_settings_map(&settings)?;
            count::run(&settings.grid);
        }
    }

    Ok(())
}
