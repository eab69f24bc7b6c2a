//! Polygon.io daily aggregates provider.
//!
//! Fetches 1-day OHLCV aggregates from `/v2/aggs/ticker/{T}/range/1/day/{from}/{to}`
//! with exponential-backoff retries. Failures feed a shared circuit breaker
//! so a batch download stops hammering the API once it starts refusing us.
//!
//! The API key comes from `POLYGON_API_KEY` and is sent as a bearer token.

use crate::bars::{Bar, BarSource, DataError};
use crate::circuit_breaker::CircuitBreaker;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const API_KEY_VAR: &str = "POLYGON_API_KEY";
const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
/// Polygon caps a single aggregates response at 50 000 bars.
const MAX_BARS: u32 = 50_000;
/// History requested when no start date is given.
const DEFAULT_LOOKBACK_DAYS: i64 = 5 * 365;

#[derive(Debug, Deserialize)]
struct AggsResponse {
    status: Option<String>,
    error: Option<String>,
    message: Option<String>,
    results: Option<Vec<Agg>>,
}

#[derive(Debug, Deserialize)]
struct Agg {
    /// Bar open time, Unix milliseconds.
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

pub struct PolygonSource {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl PolygonSource {
    pub fn new(
        api_key: impl Into<String>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            circuit_breaker,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Build from the `POLYGON_API_KEY` environment variable.
    pub fn from_env(circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                DataError::AuthenticationRequired(format!("{API_KEY_VAR} is not set"))
            })?;
        Self::new(key, circuit_breaker)
    }

    /// Point at another host (a proxy or a recorded fixture server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    fn aggs_url(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{start}/{end}?adjusted=true&sort=asc&limit={MAX_BARS}",
            self.base_url,
            ticker.to_uppercase()
        )
    }

    fn fetch_with_retry(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataError> {
        let url = self.aggs_url(ticker, start, end);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(ticker, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                std::thread::sleep(delay);
            }
            if !self.circuit_breaker.allows_request() {
                return Err(DataError::CircuitBreakerTripped);
            }

            let resp = match self.client.get(&url).bearer_auth(&self.api_key).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    self.circuit_breaker.record_failure();
                    last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(DataError::AuthenticationRequired(format!(
                    "Polygon answered HTTP {status} for {ticker}; check {API_KEY_VAR}"
                )));
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after_secs = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!(ticker, retry_after_secs, "rate limited by Polygon");
                last_error = Some(DataError::RateLimited { retry_after_secs });
                continue;
            }
            if status.is_server_error() {
                self.circuit_breaker.record_failure();
                last_error = Some(DataError::Provider(format!("HTTP {status} for {ticker}")));
                continue;
            }
            if !status.is_success() {
                return Err(DataError::Provider(format!("HTTP {status} for {ticker}")));
            }

            let body: AggsResponse = resp.json().map_err(|e| {
                DataError::ResponseFormatChanged(format!("aggregates for {ticker}: {e}"))
            })?;
            self.circuit_breaker.record_success();
            return parse_aggs(ticker, body);
        }

        Err(last_error.unwrap_or_else(|| DataError::Provider("max retries exceeded".into())))
    }
}

impl BarSource for PolygonSource {
    fn name(&self) -> &str {
        "polygon"
    }

    /// Missing bounds default to the last five years up to today (UTC).
    fn fetch(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, DataError> {
        let end = end.unwrap_or_else(|| Utc::now().date_naive());
        let start = start.unwrap_or(end - ChronoDuration::days(DEFAULT_LOOKBACK_DAYS));
        if start > end {
            return Err(DataError::Validation(format!(
                "start {start} is after end {end}"
            )));
        }
        self.fetch_with_retry(ticker, start, end)
    }
}

/// Turn an aggregates body into date-sorted bars. No results is `NoData`.
fn parse_aggs(ticker: &str, body: AggsResponse) -> Result<Vec<Bar>, DataError> {
    if body.status.as_deref() == Some("ERROR") {
        let reason = body
            .error
            .or(body.message)
            .unwrap_or_else(|| "unspecified error".into());
        return Err(DataError::Provider(format!("{ticker}: {reason}")));
    }

    let results = body.results.unwrap_or_default();
    if results.is_empty() {
        return Err(DataError::NoData {
            ticker: ticker.to_string(),
        });
    }

    let mut bars = results
        .into_iter()
        .map(|agg| {
            let date = DateTime::from_timestamp_millis(agg.t)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp {}", agg.t))
                })?;
            Ok(Bar {
                date,
                open: agg.o,
                high: agg.h,
                low: agg.l,
                close: agg.c,
                volume: agg.v,
            })
        })
        .collect::<Result<Vec<_>, DataError>>()?;
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}
