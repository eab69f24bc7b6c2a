//! MoveLab Core: training and evaluation of price-direction classifiers.
//!
//! This crate contains the single-shot fit/predict/evaluate pipeline:
//! - Feature matrices and binary label vectors with shape validation
//! - Hyperparameter defaults with field-by-field overrides
//! - Gradient-boosted decision-tree binary classifier (logistic loss)
//! - Trainer with optional early stopping and model persistence
//! - Evaluator producing accuracy/precision/recall/F1 and a verbose report
//! - Model store interface with an atomic, checksummed JSON implementation

pub mod booster;
pub mod classifier;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod metrics;
pub mod params;
pub mod persist;
pub mod trainer;
mod tree;

pub use booster::GradientBoostedClassifier;
pub use classifier::Classifier;
pub use dataset::{FeatureMatrix, LabelVector};
pub use error::{ModelError, PersistError};
pub use evaluate::{Evaluation, Evaluator, MetricsReport, ReportSink, StdoutSink, TracingSink};
pub use metrics::{ClassScore, ClassificationReport, ConfusionMatrix};
pub use params::{EvalMetric, HyperParams, ParamOverrides};
pub use persist::{JsonModelStore, ModelStore};
pub use trainer::Trainer;
