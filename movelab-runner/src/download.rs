//! Download bars from a remote source into the CSV store.

use crate::bars::{BarSource, CsvBarStore, DataError};
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{info, warn};

/// Outcome of a multi-ticker download.
#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub saved: Vec<(String, PathBuf)>,
    pub failed: Vec<(String, DataError)>,
}

impl DownloadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetch one ticker and write it to `{store}/{TICKER}.csv`, replacing any
/// earlier download. Insane bars are rejected before anything is written.
pub fn download_ticker(
    source: &dyn BarSource,
    store: &CsvBarStore,
    ticker: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<PathBuf, DataError> {
    let bars = source.fetch(ticker, start, end)?;
    if let Some(bad) = bars.iter().find(|b| !b.is_sane()) {
        return Err(DataError::Validation(format!(
            "{ticker}: insane bar on {} from {}",
            bad.date,
            source.name()
        )));
    }
    let path = store.write(ticker, &bars)?;
    info!(
        ticker,
        source = source.name(),
        bars = bars.len(),
        first = ?bars.first().map(|b| b.date),
        path = %path.display(),
        "saved bars"
    );
    Ok(path)
}

/// Download each ticker in turn. Once the source's circuit breaker trips,
/// the remaining tickers are marked failed without further requests.
pub fn download_tickers(
    source: &dyn BarSource,
    store: &CsvBarStore,
    tickers: &[String],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> DownloadSummary {
    let mut summary = DownloadSummary::default();

    for (i, ticker) in tickers.iter().enumerate() {
        match download_ticker(source, store, ticker, start, end) {
            Ok(path) => summary.saved.push((ticker.clone(), path)),
            Err(DataError::CircuitBreakerTripped) => {
                warn!(ticker, remaining = tickers.len() - i - 1, "provider blocked; stopping");
                let blocked = tickers[i..]
                    .iter()
                    .map(|t| (t.clone(), DataError::CircuitBreakerTripped));
                summary.failed.extend(blocked);
                break;
            }
            Err(e) => {
                warn!(ticker, error = %e, "download failed");
                summary.failed.push((ticker.clone(), e));
            }
        }
    }
    summary
}
