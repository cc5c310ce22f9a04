use crate::models::{CombinationResult, OptimizationReport, ParameterTriple, Trade};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Serialize)]
struct RankingRow {
    rank: usize,
    fast: usize,
    slow: usize,
    signal: usize,
    total_trades: usize,
    hits: usize,
    accuracy_pct: f64,
    avg_return_pct: f64,
    median_return_pct: f64,
    avg_bars_held: f64,
}

#[derive(Serialize)]
struct TradeRow {
    entry_date: DateTime<Utc>,
    entry_price: f64,
    exit_date: DateTime<Utc>,
    exit_price: f64,
    bars_held: usize,
    pct_return: f64,
    target_hit: bool,
}

pub fn trade_log_file_name(params: ParameterTriple) -> String {
    format!("trades_{}_{}_{}.csv", params.fast, params.slow, params.signal)
}

const RANKING_HEADER: [&str; 10] = [
    "rank",
    "fast",
    "slow",
    "signal",
    "total_trades",
    "hits",
    "accuracy_pct",
    "avg_return_pct",
    "median_return_pct",
    "avg_bars_held",
];

const TRADE_HEADER: [&str; 7] = [
    "entry_date",
    "entry_price",
    "exit_date",
    "exit_price",
    "bars_held",
    "pct_return",
    "target_hit",
];

/// Header is written even when there are no rows.
fn headed_writer<W: Write>(writer: W, header: &[&str]) -> Result<csv::Writer<W>> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer.write_record(header)?;
    Ok(csv_writer)
}

pub fn write_ranking_csv<W: Write>(writer: W, results: &[CombinationResult]) -> Result<()> {
    let mut csv_writer = headed_writer(writer, &RANKING_HEADER)?;
    for (index, result) in results.iter().enumerate() {
        csv_writer.serialize(RankingRow {
            rank: index + 1,
            fast: result.params.fast,
            slow: result.params.slow,
            signal: result.params.signal,
            total_trades: result.total_trades,
            hits: result.hits,
            accuracy_pct: result.accuracy_pct,
            avg_return_pct: result.avg_return_pct,
            median_return_pct: result.median_return_pct,
            avg_bars_held: result.avg_bars_held,
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_trades_csv<W: Write>(writer: W, trades: &[Trade]) -> Result<()> {
    let mut csv_writer = headed_writer(writer, &TRADE_HEADER)?;
    for trade in trades {
        csv_writer.serialize(TradeRow {
            entry_date: trade.entry_date,
            entry_price: trade.entry_price,
            exit_date: trade.exit_date,
            exit_price: trade.exit_price,
            bars_held: trade.bars_held(),
            pct_return: trade.pct_return,
            target_hit: trade.target_hit,
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn create_file(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

pub fn export_ranking(path: &Path, report: &OptimizationReport) -> Result<()> {
    write_ranking_csv(create_file(path)?, &report.top_results)
        .with_context(|| format!("Failed to write ranking to {}", path.display()))?;
    info!(
        "Saved {} ranked combinations to {}",
        report.top_results.len(),
        path.display()
    );
    Ok(())
}

pub fn write_trades_file(path: &Path, trades: &[Trade]) -> Result<()> {
    write_trades_csv(create_file(path)?, trades)
        .with_context(|| format!("Failed to write trades to {}", path.display()))
}

/// Writes one trade log per ranked combination; returns the number of files.
pub fn export_trade_logs(dir: &Path, results: &[CombinationResult]) -> Result<usize> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    for result in results {
        write_trades_file(&dir.join(trade_log_file_name(result.params)), &result.trades)?;
    }
    info!("Saved {} trade logs to {}", results.len(), dir.display());
    Ok(results.len())
}

pub fn export_json(path: &Path, report: &OptimizationReport) -> Result<()> {
    let mut writer = create_file(path)?;
    serde_json::to_writer_pretty(&mut writer, report)
        .with_context(|| format!("Failed to serialize report to {}", path.display()))?;
    writer.flush()?;
    info!("Saved JSON report to {}", path.display());
    Ok(())
}

pub fn format_ranking_table(results: &[CombinationResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>4}  {:>4}  {:>4}  {:>6}  {:>6}  {:>5}  {:>9}  {:>10}  {:>10}",
        "Rank", "Fast", "Slow", "Signal", "Trades", "Hits", "Accuracy", "Avg ret %", "Avg bars"
    );
    for (index, result) in results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>4}  {:>4}  {:>4}  {:>6}  {:>6}  {:>5}  {:>8.2}%  {:>10.2}  {:>10.1}",
            index + 1,
            result.params.fast,
            result.params.slow,
            result.params.signal,
            result.total_trades,
            result.hits,
            result.accuracy_pct,
            result.avg_return_pct,
            result.avg_bars_held
        );
    }
    out
}

pub fn print_summary(report: &OptimizationReport) {
    println!();
    if report.is_partial() {
        println!(
            "Partial results: {}/{} combinations evaluated before cancellation",
            report.evaluated, report.total_combinations
        );
    } else {
        println!(
            "Evaluated all {} combinations",
            report.total_combinations
        );
    }
    println!("Accepted combinations: {}", report.accepted);

    if report.top_results.is_empty() {
        println!("No combinations passed the filters.");
        return;
    }
    println!();
    print!("{}", format_ranking_table(&report.top_results));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_result() -> CombinationResult {
        let date = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        CombinationResult {
            params: ParameterTriple::new(12, 26, 9),
            total_trades: 1,
            hits: 1,
            accuracy_pct: 100.0,
            avg_return_pct: 5.5,
            median_return_pct: 5.5,
            avg_bars_held: 2.0,
            ordinal: 0,
            trades: vec![Trade {
                entry_index: 3,
                entry_date: date,
                entry_price: 100.0,
                exit_index: 5,
                exit_date: date + chrono::Duration::days(2),
                exit_price: 105.5,
                pct_return: 5.5,
                target_hit: true,
            }],
        }
    }

    #[test]
    fn trade_log_names_encode_parameters() {
        assert_eq!(
            trade_log_file_name(ParameterTriple::new(12, 26, 9)),
            "trades_12_26_9.csv"
        );
    }

    #[test]
    fn ranking_csv_has_header_and_rank() {
        let mut buffer = Vec::new();
        write_ranking_csv(&mut buffer, &[sample_result()]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("rank,fast,slow,signal,total_trades,hits,accuracy_pct,avg_return_pct,median_return_pct,avg_bars_held")
        );
        assert_eq!(lines.next(), Some("1,12,26,9,1,1,100.0,5.5,5.5,2.0"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn empty_ranking_still_has_header() {
        let mut buffer = Vec::new();
        write_ranking_csv(&mut buffer, &[]).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap().lines().count(), 1);
    }

    #[test]
    fn trade_csv_lists_each_trade() {
        let mut buffer = Vec::new();
        write_trades_csv(&mut buffer, &sample_result().trades).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().ends_with(",2,5.5,true"));
    }

    #[test]
    fn exports_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let report = OptimizationReport {
            top_results: vec![sample_result()],
            total_combinations: 4,
            evaluated: 4,
            accepted: 1,
            best_accuracy: Some(100.0),
            completed: true,
        };
        export_ranking(&dir.path().join("out/ranking.csv"), &report).unwrap();
        let written = export_trade_logs(&dir.path().join("trades"), &report.top_results).unwrap();
        export_json(&dir.path().join("report.json"), &report).unwrap();

        assert_eq!(written, 1);
        assert!(dir.path().join("out/ranking.csv").exists());
        assert!(dir.path().join("trades/trades_12_26_9.csv").exists());
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("report.json")).unwrap())
                .unwrap();
        assert_eq!(json["accepted"], 1);
        assert_eq!(json["topResults"][0]["params"]["fast"], 12);
    }

    #[test]
    fn unwritable_trade_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let path = blocker.join("trades.csv");

        let err = write_trades_file(&path, &sample_result().trades).unwrap_err();
        assert!(format!("{err:#}").contains(&blocker.display().to_string()));
    }

    #[test]
    fn table_lists_ranked_rows() {
        let table = format_ranking_table(&[sample_result()]);
        assert_eq!(table.lines().count(), 2);
        assert!(table.contains("100.00%"));
    }
}
