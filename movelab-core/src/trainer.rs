//! Trainer: fits a boosted-tree classifier and optionally persists it.
//!
//! The trainer holds only its model store. It keeps no reference to the models
//! it produces, so two calls never share state.

use crate::booster::{EvalSet, GradientBoostedClassifier};
use crate::dataset::{check_pair, FeatureMatrix, LabelVector};
use crate::error::{ModelError, Result};
use crate::params::{HyperParams, ParamOverrides};
use crate::persist::{JsonModelStore, ModelStore};
use std::path::Path;
use std::time::Instant;
use tracing::info;

pub struct Trainer {
    store: Box<dyn ModelStore>,
}

impl Default for Trainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Trainer {
    /// Trainer persisting through `JsonModelStore`.
    pub fn new() -> Self {
        Self::with_store(Box::new(JsonModelStore))
    }

    pub fn with_store(store: Box<dyn ModelStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn ModelStore {
        self.store.as_ref()
    }

    /// Fit on `(x, y)` with defaults merged with `overrides`.
    ///
    /// All `n_estimators` rounds run. Setting `early_stopping_rounds` here is
    /// an error because there is nothing to monitor; use [`Trainer::fit_with_eval`].
    /// When `persist_path` is given the model is saved there before returning.
    pub fn fit(
        &self,
        x: &FeatureMatrix,
        y: &LabelVector,
        overrides: Option<&ParamOverrides>,
        persist_path: Option<&Path>,
    ) -> Result<GradientBoostedClassifier> {
        self.fit_inner(x, y, None, overrides, persist_path)
    }

    /// Fit while tracking `eval_metric` on a held-out set.
    ///
    /// With `early_stopping_rounds` set, boosting stops once the metric has not
    /// improved for that many rounds and the ensemble is cut back to the best
    /// round. Without it, the eval set is only logged.
    pub fn fit_with_eval(
        &self,
        x: &FeatureMatrix,
        y: &LabelVector,
        eval_x: &FeatureMatrix,
        eval_y: &LabelVector,
        overrides: Option<&ParamOverrides>,
        persist_path: Option<&Path>,
    ) -> Result<GradientBoostedClassifier> {
        check_pair(eval_x, eval_y, "evaluation")?;
        if eval_x.n_features() != x.n_features() {
            return Err(ModelError::InvalidInput(format!(
                "evaluation data has {} features, training data has {}",
                eval_x.n_features(),
                x.n_features()
            )));
        }
        let eval = EvalSet {
            x: eval_x,
            y: eval_y,
        };
        self.fit_inner(x, y, Some(eval), overrides, persist_path)
    }

    fn fit_inner(
        &self,
        x: &FeatureMatrix,
        y: &LabelVector,
        eval: Option<EvalSet<'_>>,
        overrides: Option<&ParamOverrides>,
        persist_path: Option<&Path>,
    ) -> Result<GradientBoostedClassifier> {
        check_pair(x, y, "training")?;
        if x.n_features() == 0 {
            return Err(ModelError::InvalidInput(
                "training data has no feature columns".into(),
            ));
        }

        let params = HyperParams::resolve(overrides)?;
        if params.early_stopping_rounds.is_some() && eval.is_none() {
            return Err(ModelError::InvalidInput(
                "early_stopping_rounds requires an evaluation set".into(),
            ));
        }

        let started = Instant::now();
        let model = GradientBoostedClassifier::fit(x, y, params, eval)?;
        info!(
            rows = x.n_rows(),
            features = x.n_features(),
            positives = y.count_positive(),
            trees = model.n_trees(),
            best_iteration = ?model.best_iteration(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fitted model"
        );

        if let Some(path) = persist_path {
            self.store.save(&model, path)?;
        }

        Ok(model)
    }
}
