//! Hyperparameters for the boosted-tree classifier.
//!
//! `HyperParams` is the complete, resolved configuration. `ParamOverrides`
//! carries caller-supplied values; `HyperParams::merge` applies them field by
//! field and leaves every unspecified field at its default.

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric tracked on the evaluation set when early stopping is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMetric {
    /// Mean binary cross-entropy of predicted probabilities.
    #[serde(rename = "logloss")]
    LogLoss,
    /// Fraction of misclassified rows at the 0.5 threshold.
    Error,
}

impl fmt::Display for EvalMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalMetric::LogLoss => write!(f, "logloss"),
            EvalMetric::Error => write!(f, "error"),
        }
    }
}

/// Resolved hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    /// Number of boosting rounds (trees).
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub eval_metric: EvalMetric,
    /// Must stay false: labels are already 0/1.
    pub use_label_encoder: bool,
    /// Minimum hessian sum required in each child of a split.
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights.
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights.
    pub reg_alpha: f64,
    /// Minimum gain required to keep a split.
    pub gamma: f64,
    /// Row fraction sampled per round.
    pub subsample: f64,
    /// Feature fraction sampled per tree.
    pub colsample_bytree: f64,
    /// Stop after this many rounds without improvement on the eval set.
    pub early_stopping_rounds: Option<usize>,
    pub seed: u64,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 3,
            learning_rate: 0.1,
            eval_metric: EvalMetric::LogLoss,
            use_label_encoder: false,
            min_child_weight: 0.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            early_stopping_rounds: None,
            seed: 42,
        }
    }
}

/// Caller-supplied hyperparameters. `None` means "keep the default".
///
/// Unknown keys are rejected when deserializing, so a typo in a config file
/// fails loudly instead of silently training with defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParamOverrides {
    #[serde(alias = "num_rounds")]
    pub n_estimators: Option<usize>,
    pub max_depth: Option<usize>,
    pub learning_rate: Option<f64>,
    pub eval_metric: Option<EvalMetric>,
    pub use_label_encoder: Option<bool>,
    pub min_child_weight: Option<f64>,
    pub reg_lambda: Option<f64>,
    pub reg_alpha: Option<f64>,
    pub gamma: Option<f64>,
    pub subsample: Option<f64>,
    pub colsample_bytree: Option<f64>,
    pub early_stopping_rounds: Option<usize>,
    pub seed: Option<u64>,
}

impl ParamOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl HyperParams {
    /// Shallow merge: each `Some` override replaces the matching field.
    pub fn merge(mut self, overrides: &ParamOverrides) -> Self {
        fn set<T: Copy>(field: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *field = v;
            }
        }

        set(&mut self.n_estimators, overrides.n_estimators);
        set(&mut self.max_depth, overrides.max_depth);
        set(&mut self.learning_rate, overrides.learning_rate);
        set(&mut self.eval_metric, overrides.eval_metric);
        set(&mut self.use_label_encoder, overrides.use_label_encoder);
        set(&mut self.min_child_weight, overrides.min_child_weight);
        set(&mut self.reg_lambda, overrides.reg_lambda);
        set(&mut self.reg_alpha, overrides.reg_alpha);
        set(&mut self.gamma, overrides.gamma);
        set(&mut self.subsample, overrides.subsample);
        set(&mut self.colsample_bytree, overrides.colsample_bytree);
        if overrides.early_stopping_rounds.is_some() {
            self.early_stopping_rounds = overrides.early_stopping_rounds;
        }
        set(&mut self.seed, overrides.seed);
        self
    }

    /// Defaults merged with optional overrides, then validated.
    pub fn resolve(overrides: Option<&ParamOverrides>) -> Result<Self> {
        let params = match overrides {
            Some(o) => Self::default().merge(o),
            None => Self::default(),
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ModelError::InvalidInput(msg));

        if self.n_estimators == 0 {
            return invalid("n_estimators must be a positive integer".into());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            ));
        }
        if self.use_label_encoder {
            return invalid("use_label_encoder is not supported; supply 0/1 labels".into());
        }
        for (name, value) in [
            ("min_child_weight", self.min_child_weight),
            ("reg_lambda", self.reg_lambda),
            ("reg_alpha", self.reg_alpha),
            ("gamma", self.gamma),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return invalid(format!("{name} must be >= 0, got {value}"));
            }
        }
        for (name, value) in [
            ("subsample", self.subsample),
            ("colsample_bytree", self.colsample_bytree),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return invalid(format!("{name} must be in (0, 1], got {value}"));
            }
        }
        if self.early_stopping_rounds == Some(0) {
            return invalid("early_stopping_rounds must be >= 1 when set".into());
        }
        Ok(())
    }
}
