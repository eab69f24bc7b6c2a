//! Chronological train/test split.
//!
//! Rows are never shuffled: the test set is always the most recent tail, so
//! the model is scored only on dates after everything it was trained on.

use chrono::NaiveDate;
use movelab_core::{FeatureMatrix, LabelVector};
use thiserror::Error;

use crate::features::LabeledData;

#[derive(Debug, Error, PartialEq)]
pub enum SplitError {
    #[error("split fraction must be in (0, 1), got {0}")]
    InvalidFraction(f64),

    #[error("{rows} rows cannot be split with fraction {fraction}: one side would be empty")]
    TooFewRows { rows: usize, fraction: f64 },
}

/// One side of a split.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub x: FeatureMatrix,
    pub y: LabelVector,
    pub dates: Vec<NaiveDate>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    fn slice(data: &LabeledData, range: std::ops::Range<usize>) -> Self {
        let idx: Vec<usize> = range.clone().collect();
        Self {
            x: data.x.select_rows(&idx),
            y: data.y.select(&idx),
            dates: data.dates[range].to_vec(),
        }
    }

    /// Split off the most recent `fraction` of this partition.
    pub fn split_tail(&self, fraction: f64) -> Result<(Partition, Partition), SplitError> {
        let data = LabeledData {
            dates: self.dates.clone(),
            x: self.x.clone(),
            y: self.y.clone(),
        };
        let s = train_test_split(&data, fraction)?;
        Ok((s.train, s.test))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: Partition,
    pub test: Partition,
}

/// Number of test rows for `rows` total: `ceil(rows * fraction)`.
pub fn test_rows_for(rows: usize, fraction: f64) -> usize {
    (rows as f64 * fraction).ceil() as usize
}

/// Split `data` so the last `ceil(n * test_fraction)` rows form the test set.
pub fn train_test_split(
    data: &LabeledData,
    test_fraction: f64,
) -> Result<TrainTestSplit, SplitError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(SplitError::InvalidFraction(test_fraction));
    }

    let n = data.len();
    let n_test = test_rows_for(n, test_fraction);
    if n_test == 0 || n_test >= n {
        return Err(SplitError::TooFewRows {
            rows: n,
            fraction: test_fraction,
        });
    }
    let cut = n - n_test;

    Ok(TrainTestSplit {
        train: Partition::slice(data, 0..cut),
        test: Partition::slice(data, cut..n),
    })
}
