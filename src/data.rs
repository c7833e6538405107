use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use crate::error::AnalysisError;

/// CSV row as found in typical daily exports (`date,open,high,low,close,volume`).
/// Capitalized headers are accepted as well; extra columns are ignored.
#[derive(Debug, Deserialize)]
pub struct BarRow {
    #[serde(alias = "Date")]
    pub date: NaiveDate,
    #[serde(alias = "Open")]
    pub open: f64,
    #[serde(alias = "High")]
    pub high: f64,
    #[serde(alias = "Low")]
    pub low: f64,
    #[serde(alias = "Close")]
    pub close: f64,
    #[serde(alias = "Volume")]
    pub volume: f64,
}

/// One daily OHLCV session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Inclusive calendar span of a slice of bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    pub fn of(bars: &[Bar]) -> Option<Self> {
        Some(Self {
            start_date: bars.first()?.date,
            end_date: bars.last()?.date,
        })
    }
}

impl From<BarRow> for Bar {
    fn from(row: BarRow) -> Self {
        Self {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume.max(0.0).round() as u64,
        }
    }
}

pub fn get_bars_from_input_file(input: &Path) -> Result<Vec<Bar>> {
    let file =
        File::open(input).with_context(|| format!("failed to open input file: {:?}", input))?;

    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);

    let mut bars: Vec<Bar> = Vec::new();

    for result in rdr.deserialize::<BarRow>() {
        let row: BarRow = result.with_context(|| "failed to deserialize CSV row")?;
        bars.push(row.into());
    }
    Ok(normalize_daily(bars))
}

/// Order bars ascending by date, keeping one bar per session.
/// When a date appears more than once, the *last* bar seen for it wins,
/// so providers that append a corrected bar override the stale one.
pub fn normalize_daily(bars: Vec<Bar>) -> Vec<Bar> {
    let mut buckets: BTreeMap<NaiveDate, Bar> = BTreeMap::new();

    for bar in bars {
        buckets.insert(bar.date, bar);
    }

    buckets.into_values().collect()
}

/// Check the engine's input contract: non-empty, finite positive prices,
/// `high >= low`, strictly ascending dates.
pub fn validate_series(bars: &[Bar]) -> Result<(), AnalysisError> {
    if bars.is_empty() {
        return Err(AnalysisError::EmptySeries);
    }

    for (index, bar) in bars.iter().enumerate() {
        let prices = [bar.open, bar.high, bar.low, bar.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(AnalysisError::InvalidBar {
                index,
                reason: "non-finite price",
            });
        }
        if prices.iter().any(|&p| p <= 0.0) {
            return Err(AnalysisError::InvalidBar {
                index,
                reason: "non-positive price",
            });
        }
        if bar.high < bar.low {
            return Err(AnalysisError::InvalidBar {
                index,
                reason: "high below low",
            });
        }
        if index > 0 && bar.date <= bars[index - 1].date {
            return Err(AnalysisError::OutOfOrder { index });
        }
    }
    Ok(())
}

pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

pub fn volumes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume as f64).collect()
}

/// Highest high in `bars` with its position; first occurrence wins ties.
pub fn highest_high(bars: &[Bar]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, bar) in bars.iter().enumerate() {
        if best.is_none_or(|(_, v)| bar.high > v) {
            best = Some((i, bar.high));
        }
    }
    best
}

/// Lowest low in `bars` with its position; first occurrence wins ties.
pub fn lowest_low(bars: &[Bar]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, bar) in bars.iter().enumerate() {
        if best.is_none_or(|(_, v)| bar.low < v) {
            best = Some((i, bar.low));
        }
    }
    best
}

/// The trailing `n` bars (or all of them when shorter).
pub fn tail(bars: &[Bar], n: usize) -> &[Bar] {
    &bars[bars.len().saturating_sub(n)..]
}
