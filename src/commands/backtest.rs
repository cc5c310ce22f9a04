use crate::config::BacktestConfig;
use crate::market_data::load_price_csv;
use crate::models::ParameterTriple;
use crate::optimizer::{backtest_combination, CombinationBacktest};
use crate::performance::ScoreOutcome;
use crate::report;
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn run(
    data_file: &Path,
    params: ParameterTriple,
    config: &BacktestConfig,
    trades_out: Option<&Path>,
) -> Result<CombinationBacktest> {
    let series = load_price_csv(data_file)?;
    info!("Backtesting {} over {} bars", params, series.len());

    let backtest = backtest_combination(&series, params, config)?;

    println!("{} trades for {}", backtest.trades.len(), params);
    for trade in &backtest.trades {
        println!(
            "  {} @ {:.4} -> {} @ {:.4}  {:+.2}%  {}",
            trade.entry_date.format("%Y-%m-%d"),
            trade.entry_price,
            trade.exit_date.format("%Y-%m-%d"),
            trade.exit_price,
            trade.pct_return,
            if trade.target_hit { "hit" } else { "miss" }
        );
    }

    match &backtest.outcome {
        ScoreOutcome::Accepted(result) => {
            println!();
            print!("{}", report::format_ranking_table(std::slice::from_ref(result)));
        }
        ScoreOutcome::NoTrades => println!("Rejected: no crossovers produced a trade"),
        ScoreOutcome::TooFewTrades {
            total_trades,
            min_trades,
        } => println!(
            "Rejected: {} trades is below the minimum of {}",
            total_trades, min_trades
        ),
        ScoreOutcome::BelowAccuracy {
            accuracy_pct,
            min_accuracy,
        } => println!(
            "Rejected: accuracy {:.2}% is below the minimum of {:.2}%",
            accuracy_pct, min_accuracy
        ),
    }

    if let Some(path) = trades_out {
        report::write_trades_file(path, &backtest.trades)?;
        info!("Saved {} trades to {}", backtest.trades.len(), path.display());
    }
    Ok(backtest)
}
