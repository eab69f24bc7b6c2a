//! Feature matrices and binary label vectors.
//!
//! Both are read-only once built. Shape checks live here so the trainer and
//! evaluator reject bad input the same way.

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};

/// Row-major matrix of named numeric features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    names: Vec<String>,
    values: Vec<f64>,
    n_rows: usize,
}

impl FeatureMatrix {
    /// Build a matrix from named columns and row vectors.
    ///
    /// Every row must have exactly one value per name, and every value must be
    /// finite. There is no missing-value policy: NaN is rejected, not imputed.
    pub fn from_rows<S: Into<String>>(
        names: impl IntoIterator<Item = S>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let width = names.len();
        let n_rows = rows.len();
        let mut values = Vec::with_capacity(n_rows * width);

        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(ModelError::InvalidInput(format!(
                    "row {i} has {} values, expected {width}",
                    row.len()
                )));
            }
            if let Some(j) = row.iter().position(|v| !v.is_finite()) {
                return Err(ModelError::InvalidInput(format!(
                    "non-finite value at row {i}, feature '{}'",
                    names[j]
                )));
            }
            values.extend(row);
        }

        Ok(Self {
            names,
            values,
            n_rows,
        })
    }

    /// Build a matrix with generated column names `f0, f1, ...`.
    ///
    /// The width is taken from the first row.
    pub fn unnamed(rows: Vec<Vec<f64>>) -> Result<Self> {
        let width = rows.first().map_or(0, Vec::len);
        let names: Vec<String> = (0..width).map(|j| format!("f{j}")).collect();
        Self::from_rows(names, rows)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    /// Feature values of row `i`. Panics if `i >= n_rows()`.
    pub fn row(&self, i: usize) -> &[f64] {
        let width = self.n_features();
        &self.values[i * width..(i + 1) * width]
    }

    pub fn get(&self, row: usize, feature: usize) -> f64 {
        self.values[row * self.n_features() + feature]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.n_rows).map(move |i| self.row(i))
    }

    /// New matrix with the rows at `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let width = self.n_features();
        let mut values = Vec::with_capacity(indices.len() * width);
        for &i in indices {
            values.extend_from_slice(self.row(i));
        }
        Self {
            names: self.names.clone(),
            values,
            n_rows: indices.len(),
        }
    }
}

/// Binary labels (0 or 1), one per matrix row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelVector(Vec<u8>);

impl LabelVector {
    /// Wrap a label sequence. Fails if any label is not 0 or 1.
    pub fn new(labels: Vec<u8>) -> Result<Self> {
        if let Some(i) = labels.iter().position(|&l| l > 1) {
            return Err(ModelError::InvalidInput(format!(
                "label at index {i} is {}, expected 0 or 1",
                labels[i]
            )));
        }
        Ok(Self(labels))
    }

    pub fn from_bools(labels: impl IntoIterator<Item = bool>) -> Self {
        Self(labels.into_iter().map(u8::from).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }

    pub fn count_positive(&self) -> usize {
        self.0.iter().filter(|&&l| l == 1).count()
    }

    /// Labels at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self(indices.iter().map(|&i| self.0[i]).collect())
    }
}

impl TryFrom<Vec<u8>> for LabelVector {
    type Error = ModelError;

    fn try_from(labels: Vec<u8>) -> Result<Self> {
        Self::new(labels)
    }
}

/// Reject empty or mismatched (matrix, labels) pairs.
pub fn check_pair(x: &FeatureMatrix, y: &LabelVector, what: &str) -> Result<()> {
    if x.is_empty() || y.is_empty() {
        return Err(ModelError::InvalidInput(format!(
            "{what} data is empty ({} rows, {} labels)",
            x.n_rows(),
            y.len()
        )));
    }
    if x.n_rows() != y.len() {
        return Err(ModelError::InvalidInput(format!(
            "{what} data has {} rows but {} labels",
            x.n_rows(),
            y.len()
        )));
    }
    Ok(())
}
