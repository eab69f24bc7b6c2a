//! The prediction contract consumed by the evaluator.

use crate::dataset::{FeatureMatrix, LabelVector};
use crate::error::Result;

/// Anything that maps a feature matrix to one binary label per row.
///
/// `predict` takes `&self`: a fitted model is immutable, and evaluation never
/// changes it.
pub trait Classifier: Send + Sync {
    fn predict(&self, x: &FeatureMatrix) -> Result<LabelVector>;

    /// Human-readable model name for logs and reports.
    fn name(&self) -> &str {
        "classifier"
    }
}
