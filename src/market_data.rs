use crate::error::OptimizerError;
use crate::models::PriceBar;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::{info, warn};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Validated closing-price series, sorted ascending by date.
///
/// Closes are kept in a contiguous array next to the bars since every
/// indicator pass reads only the closes.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
    closes: Vec<f64>,
}

impl PriceSeries {
    pub fn new(mut bars: Vec<PriceBar>) -> Result<Self, OptimizerError> {
        if bars.is_empty() {
            return Err(OptimizerError::EmptySeries);
        }

        let out_of_order = bars
            .windows(2)
            .filter(|pair| pair[1].date < pair[0].date)
            .count();
        if out_of_order > 0 {
            warn!(
                "Price series had {} out-of-order bar(s); sorting ascending by date",
                out_of_order
            );
            bars.sort_by(|a, b| a.date.cmp(&b.date));
        }

        let closes = bars.iter().map(|bar| bar.close).collect();
        Ok(Self { bars, closes })
    }

    pub fn from_pairs<I>(pairs: I) -> Result<Self, OptimizerError>
    where
        I: IntoIterator<Item = (DateTime<Utc>, f64)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(date, close)| PriceBar { date, close })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.bars.len() - 1
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn close(&self, index: usize) -> f64 {
        self.closes[index]
    }

    pub fn date(&self, index: usize) -> DateTime<Utc> {
        self.bars[index].date
    }

    pub fn first_date(&self) -> DateTime<Utc> {
        self.bars[0].date
    }

    pub fn last_date(&self) -> DateTime<Utc> {
        self.bars[self.bars.len() - 1].date
    }
}

/// Parses the date formats accepted in price files.
pub fn parse_bar_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    None
}

fn parse_close(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Reads a CSV with `Date` and `Close` columns (header names are matched
/// case-insensitively, other columns are ignored).
pub fn load_price_csv(path: &Path) -> Result<PriceSeries> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let series = read_price_csv(file)
        .with_context(|| format!("failed to load prices from {}", path.display()))?;
    info!(
        "Loaded {} bars from {} ({} - {})",
        series.len(),
        path.display(),
        series.first_date().format("%Y-%m-%d"),
        series.last_date().format("%Y-%m-%d")
    );
    Ok(series)
}

pub fn read_price_csv<R: Read>(reader: R) -> Result<PriceSeries> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(name))
    };
    let (Some(date_column), Some(close_column)) = (column("date"), column("close")) else {
        return Err(anyhow!(
            "price file must contain 'Date' and 'Close' columns (found: {})",
            headers.iter().collect::<Vec<_>>().join(", ")
        ));
    };

    let mut bars = Vec::new();
    for (offset, record) in csv_reader.records().enumerate() {
        // Header is row 1.
        let row = offset + 2;
        let record = record?;
        let raw_date = record.get(date_column).unwrap_or_default();
        let raw_close = record.get(close_column).unwrap_or_default();

        let date = parse_bar_date(raw_date).ok_or_else(|| OptimizerError::InvalidDate {
            row,
            value: raw_date.to_string(),
        })?;
        let close = parse_close(raw_close).ok_or_else(|| OptimizerError::InvalidClose {
            row,
            value: raw_close.to_string(),
        })?;
        bars.push(PriceBar { date, close });
    }

    Ok(PriceSeries::new(bars)?)
}
