//! Feature engineering: daily bars → labeled feature matrix.
//!
//! Every feature at bar `t` looks only at bars `..= t`; the label alone looks
//! forward, to `t + horizon`. Rows whose label would fall past the last bar
//! are dropped, as are warmup rows without a full lookback window.

use chrono::NaiveDate;
use movelab_core::{FeatureMatrix, LabelVector};
use thiserror::Error;

use crate::bars::Bar;

/// Longest lookback window used by [`OhlcvFeatures`].
const SMA_LONG: usize = 20;
const SMA_SHORT: usize = 10;
const VOL_WINDOW: usize = 10;
const VOLUME_WINDOW: usize = 10;

/// Feature names produced by [`OhlcvFeatures`], in column order.
pub const OHLCV_FEATURE_NAMES: [&str; 7] = [
    "ret_1",
    "ret_5",
    "sma_10_ratio",
    "sma_20_ratio",
    "volatility_10",
    "range_pct",
    "volume_ratio_10",
];

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("need at least {needed} bars, got {got}")]
    NotEnoughBars { needed: usize, got: usize },

    #[error("horizon must be at least 1")]
    ZeroHorizon,

    #[error("invalid feature values: {0}")]
    Invalid(String),
}

/// Feature matrix, labels, and the bar date each row was computed on.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledData {
    pub dates: Vec<NaiveDate>,
    pub x: FeatureMatrix,
    pub y: LabelVector,
}

impl LabeledData {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Fraction of rows labeled 1.
    pub fn positive_rate(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.y.count_positive() as f64 / self.len() as f64
        }
    }
}

/// Turns a bar series into model inputs.
pub trait FeatureBuilder: Send + Sync {
    fn name(&self) -> &str;

    /// Bars must be sorted by date ascending.
    fn build(&self, bars: &[Bar]) -> Result<LabeledData, FeatureError>;
}

/// Price/volume features with an "up over the next `horizon` bars" label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OhlcvFeatures {
    pub horizon: usize,
}

impl Default for OhlcvFeatures {
    fn default() -> Self {
        Self { horizon: 1 }
    }
}

impl OhlcvFeatures {
    pub fn new(horizon: usize) -> Self {
        Self { horizon }
    }

    /// Index of the first bar with a complete lookback window.
    pub fn warmup(&self) -> usize {
        SMA_LONG - 1
    }

    /// Minimum bar count that yields one labeled row.
    pub fn min_bars(&self) -> usize {
        self.warmup() + self.horizon + 1
    }

    fn row_at(&self, bars: &[Bar], t: usize) -> Vec<f64> {
        let close = bars[t].close;
        let closes = |n: usize| bars[t + 1 - n..=t].iter().map(|b| b.close);

        let sma_short = mean(closes(SMA_SHORT));
        let sma_long = mean(closes(SMA_LONG));

        let returns: Vec<f64> = (t + 1 - VOL_WINDOW..=t)
            .map(|i| bars[i].close / bars[i - 1].close - 1.0)
            .collect();

        let avg_volume = mean(bars[t + 1 - VOLUME_WINDOW..=t].iter().map(|b| b.volume));
        let volume_ratio = if avg_volume > 0.0 {
            bars[t].volume / avg_volume
        } else {
            1.0
        };

        vec![
            close / bars[t - 1].close - 1.0,
            close / bars[t - 5].close - 1.0,
            close / sma_short - 1.0,
            close / sma_long - 1.0,
            std_dev(&returns),
            (bars[t].high - bars[t].low) / close,
            volume_ratio,
        ]
    }
}

impl FeatureBuilder for OhlcvFeatures {
    fn name(&self) -> &str {
        "ohlcv"
    }

    fn build(&self, bars: &[Bar]) -> Result<LabeledData, FeatureError> {
        if self.horizon == 0 {
            return Err(FeatureError::ZeroHorizon);
        }
        if bars.len() < self.min_bars() {
            return Err(FeatureError::NotEnoughBars {
                needed: self.min_bars(),
                got: bars.len(),
            });
        }

        let last = bars.len() - 1 - self.horizon;
        let mut dates = Vec::with_capacity(last + 1 - self.warmup());
        let mut rows = Vec::with_capacity(dates.capacity());
        let mut labels = Vec::with_capacity(dates.capacity());

        for t in self.warmup()..=last {
            dates.push(bars[t].date);
            rows.push(self.row_at(bars, t));
            labels.push(bars[t + self.horizon].close > bars[t].close);
        }

        let x = FeatureMatrix::from_rows(OHLCV_FEATURE_NAMES, rows)
            .map_err(|e| FeatureError::Invalid(e.to_string()))?;
        Ok(LabeledData {
            dates,
            x,
            y: LabelVector::from_bools(labels),
        })
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values.iter().copied());
    let var = mean(values.iter().map(|v| (v - m).powi(2)));
    var.sqrt()
}
