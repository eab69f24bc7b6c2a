//! Daily OHLCV bars, the bar source trait, and the CSV-backed store.
//!
//! The `BarSource` trait abstracts over where bars come from (the CSV cache
//! on disk, a test fixture, or the Polygon.io provider in `polygon`) so the
//! experiment runner and the downloader can be driven by any of them.
//!
//! CSV layout: `{dir}/{TICKER}.csv` with header
//! `Date,Open,High,Low,Close,Volume`, one row per trading day.

use chrono::NaiveDate;
use movelab_core::persist::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Basic OHLCV sanity check: high >= low, high >= open/close, positive prices.
    pub fn is_sane(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
    }
}

/// Structured error types for bar loading.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no bar file for '{ticker}' at {path}")]
    NotFound { ticker: String, path: PathBuf },

    /// The source answered but had no bars in the requested range.
    #[error("no bars for '{ticker}' in the requested range")]
    NoData { ticker: String },

    #[error("parse error in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("provider error: {0}")]
    Provider(String),
}

/// Source of daily bars for a ticker.
pub trait BarSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Bars for `ticker` with `start <= date <= end` (either bound optional),
    /// sorted by date ascending. An empty range is `DataError::NoData`.
    fn fetch(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, DataError>;
}

/// Row shape of the on-disk CSV. Dates may carry a time suffix
/// (`2023-01-03 05:00:00`); only the date part is kept.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: f64,
}

/// Directory of per-ticker CSV files.
#[derive(Debug, Clone)]
pub struct CsvBarStore {
    dir: PathBuf,
}

impl CsvBarStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the CSV file for a ticker: `{dir}/{TICKER}.csv`
    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", ticker.to_uppercase()))
    }

    /// Load every bar for a ticker, sorted by date, rejecting insane or
    /// duplicate-date rows.
    pub fn read(&self, ticker: &str) -> Result<Vec<Bar>, DataError> {
        let path = self.path_for(ticker);
        if !path.exists() {
            return Err(DataError::NotFound {
                ticker: ticker.to_string(),
                path,
            });
        }

        let parse_err = |reason: String| DataError::Parse {
            path: path.clone(),
            reason,
        };

        let mut reader = csv::Reader::from_path(&path).map_err(|e| parse_err(e.to_string()))?;
        let mut bars = Vec::new();
        for (i, record) in reader.deserialize::<CsvRow>().enumerate() {
            let row = record.map_err(|e| parse_err(e.to_string()))?;
            let date = parse_date(&row.date)
                .ok_or_else(|| parse_err(format!("row {}: bad date '{}'", i + 1, row.date)))?;
            let bar = Bar {
                date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            };
            if !bar.is_sane() {
                return Err(DataError::Validation(format!(
                    "{ticker}: insane bar on {date}"
                )));
            }
            bars.push(bar);
        }

        bars.sort_by_key(|b| b.date);
        if let Some(w) = bars.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(DataError::Validation(format!(
                "{ticker}: duplicate bar for {}",
                w[0].date
            )));
        }
        Ok(bars)
    }

    /// Write bars for a ticker, replacing any existing file atomically.
    pub fn write(&self, ticker: &str, bars: &[Bar]) -> Result<PathBuf, DataError> {
        if bars.is_empty() {
            return Err(DataError::NoData {
                ticker: ticker.to_string(),
            });
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        for bar in bars {
            writer
                .serialize(CsvRow {
                    date: bar.date.format("%Y-%m-%d").to_string(),
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                })
                .map_err(|e| DataError::Io(format!("csv encode: {e}")))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| DataError::Io(format!("csv flush: {e}")))?;

        let path = self.path_for(ticker);
        write_atomic(&path, &bytes).map_err(|e| DataError::Io(e.to_string()))?;
        Ok(path)
    }
}

impl BarSource for CsvBarStore {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, DataError> {
        let bars: Vec<Bar> = self
            .read(ticker)?
            .into_iter()
            .filter(|b| start.map_or(true, |s| b.date >= s) && end.map_or(true, |e| b.date <= e))
            .collect();

        if bars.is_empty() {
            return Err(DataError::NoData {
                ticker: ticker.to_string(),
            });
        }
        Ok(bars)
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
