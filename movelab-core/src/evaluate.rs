//! Evaluator: scores a fitted classifier on held-out labeled rows.
//!
//! The four headline metrics are computed from the confusion matrix with the
//! zero-division policy in [`crate::metrics`]. Verbose mode additionally hands
//! a classification report and the confusion matrix to a [`ReportSink`]; it
//! never changes the returned numbers.

use crate::classifier::Classifier;
use crate::dataset::{check_pair, FeatureMatrix, LabelVector};
use crate::error::{ModelError, Result};
use crate::metrics::{ClassificationReport, ConfusionMatrix};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Headline classification metrics, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

impl MetricsReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        Self {
            accuracy: cm.accuracy(),
            precision: cm.precision(),
            recall: cm.recall(),
            f1_score: cm.f1(),
        }
    }

    /// The four metrics keyed by name.
    pub fn as_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("accuracy", self.accuracy),
            ("precision", self.precision),
            ("recall", self.recall),
            ("f1_score", self.f1_score),
        ])
    }
}

/// Metrics plus the detail behind them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub metrics: MetricsReport,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
}

/// Destination for the verbose evaluation report.
pub trait ReportSink: Send + Sync {
    fn emit(&self, report: &ClassificationReport, confusion: &ConfusionMatrix);
}

/// Prints the report to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn emit(&self, report: &ClassificationReport, confusion: &ConfusionMatrix) {
        println!("\nClassification Report:");
        println!("{report}");
        println!("Confusion Matrix:");
        println!("{confusion}");
    }
}

/// Sends the report through `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn emit(&self, report: &ClassificationReport, confusion: &ConfusionMatrix) {
        info!("classification report:\n{report}");
        info!("confusion matrix:\n{confusion}");
    }
}

pub struct Evaluator {
    sink: Box<dyn ReportSink>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// Evaluator printing verbose reports to stdout.
    pub fn new() -> Self {
        Self::with_sink(Box::new(StdoutSink))
    }

    pub fn with_sink(sink: Box<dyn ReportSink>) -> Self {
        Self { sink }
    }

    /// Score `model` on `(x, y)`.
    pub fn evaluate(
        &self,
        model: &dyn Classifier,
        x: &FeatureMatrix,
        y: &LabelVector,
        verbose: bool,
    ) -> Result<MetricsReport> {
        self.evaluate_detailed(model, x, y, verbose)
            .map(|e| e.metrics)
    }

    /// Like [`Evaluator::evaluate`], returning the confusion matrix and
    /// per-class report as well.
    pub fn evaluate_detailed(
        &self,
        model: &dyn Classifier,
        x: &FeatureMatrix,
        y: &LabelVector,
        verbose: bool,
    ) -> Result<Evaluation> {
        check_pair(x, y, "test")?;

        let predicted = model.predict(x).map_err(|e| match e {
            ModelError::Prediction(msg) => ModelError::Prediction(msg),
            other => ModelError::Prediction(other.to_string()),
        })?;
        if predicted.len() != y.len() {
            return Err(ModelError::Prediction(format!(
                "{} returned {} predictions for {} rows",
                model.name(),
                predicted.len(),
                y.len()
            )));
        }

        let confusion = ConfusionMatrix::from_labels(y.as_slice(), predicted.as_slice());
        let metrics = MetricsReport::from_confusion(&confusion);
        let report = ClassificationReport::from_confusion(&confusion);

        if confusion.tp + confusion.fn_ == 0 {
            warn!(rows = y.len(), "test labels contain no positives; precision/recall default to 0");
        }
        info!(
            model = model.name(),
            rows = y.len(),
            accuracy = metrics.accuracy,
            precision = metrics.precision,
            recall = metrics.recall,
            f1_score = metrics.f1_score,
            "evaluated model"
        );

        if verbose {
            self.sink.emit(&report, &confusion);
        }

        Ok(Evaluation {
            metrics,
            confusion,
            report,
        })
    }
}
