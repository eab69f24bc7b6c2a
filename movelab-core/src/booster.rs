//! Gradient-boosted tree binary classifier (logistic loss).
//!
//! Boosting starts from the log-odds of the training positive rate and adds
//! one tree per round, each fitted to the gradient (p - y) and hessian
//! p(1 - p) of the current predictions. Prediction sums the shrunken tree
//! outputs, applies the sigmoid, and thresholds at 0.5.

use crate::classifier::Classifier;
use crate::dataset::{FeatureMatrix, LabelVector};
use crate::error::{ModelError, Result};
use crate::metrics::{error_rate, log_loss};
use crate::params::{EvalMetric, HyperParams};
use crate::tree::{Tree, TreeBuilder};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

const MIN_HESSIAN: f64 = 1e-16;

/// A fitted boosted-tree ensemble. Immutable once returned by the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    params: HyperParams,
    feature_names: Vec<String>,
    /// Initial margin in log-odds space.
    base_score: f64,
    trees: Vec<Tree>,
    /// Round kept by early stopping, if it ran.
    best_iteration: Option<usize>,
}

/// Held-out rows monitored for early stopping.
pub(crate) struct EvalSet<'a> {
    pub x: &'a FeatureMatrix,
    pub y: &'a LabelVector,
}

impl GradientBoostedClassifier {
    /// Run all boosting rounds. Inputs are already shape-checked.
    pub(crate) fn fit(
        x: &FeatureMatrix,
        y: &LabelVector,
        params: HyperParams,
        eval: Option<EvalSet<'_>>,
    ) -> Result<Self> {
        let n_rows = x.n_rows();
        let n_features = x.n_features();
        let labels: Vec<f64> = y.iter().map(f64::from).collect();

        let positive_rate = (y.count_positive() as f64 / n_rows as f64).clamp(1e-7, 1.0 - 1e-7);
        let base_score = (positive_rate / (1.0 - positive_rate)).ln();

        let mut margins = vec![base_score; n_rows];
        let mut eval_margins = eval.as_ref().map(|e| vec![base_score; e.x.n_rows()]);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees: Vec<Tree> = Vec::with_capacity(params.n_estimators);

        let stopping = params.early_stopping_rounds.filter(|_| eval.is_some());
        let mut best: Option<(usize, f64)> = None;

        for round in 0..params.n_estimators {
            let mut grad = Vec::with_capacity(n_rows);
            let mut hess = Vec::with_capacity(n_rows);
            for (&m, &t) in margins.iter().zip(&labels) {
                let p = sigmoid(m);
                grad.push(p - t);
                hess.push((p * (1.0 - p)).max(MIN_HESSIAN));
            }

            let rows = sample_indices(&mut rng, n_rows, params.subsample);
            let features = sample_indices(&mut rng, n_features, params.colsample_bytree);

            let tree = TreeBuilder {
                x,
                grad: &grad,
                hess: &hess,
                features: &features,
                params: &params,
            }
            .build(&rows);

            for (i, m) in margins.iter_mut().enumerate() {
                *m += params.learning_rate * tree.predict(x.row(i));
            }
            if margins.iter().any(|m| !m.is_finite()) {
                return Err(ModelError::Training(format!(
                    "non-finite margin after round {round}"
                )));
            }

            if let (Some(e), Some(em)) = (eval.as_ref(), eval_margins.as_mut()) {
                for (i, m) in em.iter_mut().enumerate() {
                    *m += params.learning_rate * tree.predict(e.x.row(i));
                }
                let probs: Vec<f64> = em.iter().map(|&m| sigmoid(m)).collect();
                let score = match params.eval_metric {
                    EvalMetric::LogLoss => log_loss(e.y.as_slice(), &probs),
                    EvalMetric::Error => error_rate(e.y.as_slice(), &probs),
                };
                debug!(round, metric = %params.eval_metric, score, "eval");

                if best.map_or(true, |(_, s)| score < s) {
                    best = Some((round, score));
                }
            }

            trees.push(tree);

            if let (Some(patience), Some((best_round, best_score))) = (stopping, best) {
                if round - best_round >= patience {
                    debug!(
                        round,
                        best_round,
                        best_score,
                        "early stopping: no improvement in {patience} rounds"
                    );
                    break;
                }
            }
        }

        let best_iteration = match (stopping, best) {
            (Some(_), Some((best_round, _))) => {
                trees.truncate(best_round + 1);
                Some(best_round)
            }
            _ => None,
        };

        Ok(Self {
            params,
            feature_names: x.feature_names().to_vec(),
            base_score,
            trees,
            best_iteration,
        })
    }

    /// Probability of label 1 for each row.
    pub fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        self.check_width(x)?;
        Ok(x.rows().map(|row| sigmoid(self.margin(row))).collect())
    }

    /// Gain-based importance per feature, normalized to sum to 1.
    pub fn feature_importances(&self) -> Vec<(String, f64)> {
        let mut totals = vec![0.0; self.feature_names.len()];
        for tree in &self.trees {
            tree.accumulate_gain(&mut totals);
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|t| *t /= sum);
        }
        self.feature_names.iter().cloned().zip(totals).collect()
    }

    pub fn params(&self) -> &HyperParams {
        &self.params
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    /// Deepest tree in the ensemble.
    pub fn max_tree_depth(&self) -> usize {
        self.trees.iter().map(Tree::depth).max().unwrap_or(0)
    }

    /// Structural check for deserialized models: every tree must be well
    /// linked and every split must reference an existing feature.
    pub(crate) fn check_integrity(&self) -> std::result::Result<(), String> {
        let width = self.feature_names.len();
        for (i, tree) in self.trees.iter().enumerate() {
            tree.check_links().map_err(|e| format!("tree {i}: {e}"))?;
            if let Some(f) = tree.max_feature() {
                if f >= width {
                    return Err(format!(
                        "tree {i} splits on feature {f} but the model has {width} features"
                    ));
                }
            }
        }
        if !self.base_score.is_finite() {
            return Err("base score is not finite".into());
        }
        Ok(())
    }

    fn margin(&self, row: &[f64]) -> f64 {
        let lr = self.params.learning_rate;
        self.base_score + self.trees.iter().map(|t| lr * t.predict(row)).sum::<f64>()
    }

    fn check_width(&self, x: &FeatureMatrix) -> Result<()> {
        if x.n_features() != self.feature_names.len() {
            return Err(ModelError::Prediction(format!(
                "model was trained on {} features, got {}",
                self.feature_names.len(),
                x.n_features()
            )));
        }
        Ok(())
    }
}

impl Classifier for GradientBoostedClassifier {
    fn predict(&self, x: &FeatureMatrix) -> Result<LabelVector> {
        let probs = self.predict_proba(x)?;
        Ok(LabelVector::from_bools(probs.into_iter().map(|p| p > 0.5)))
    }

    fn name(&self) -> &str {
        "gradient_boosted_trees"
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Sorted sample of `fraction * n` indices (at least one); all of them when
/// `fraction >= 1`.
fn sample_indices(rng: &mut StdRng, n: usize, fraction: f64) -> Vec<usize> {
    if fraction >= 1.0 || n == 0 {
        return (0..n).collect();
    }
    let amount = ((n as f64 * fraction).round() as usize).clamp(1, n);
    let mut picked = rand::seq::index::sample(rng, n, amount).into_vec();
    picked.sort_unstable();
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (FeatureMatrix, LabelVector) {
        let x = FeatureMatrix::unnamed(vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ])
        .unwrap();
        let y = LabelVector::new(vec![0, 0, 1, 1]).unwrap();
        (x, y)
    }

    #[test]
    fn fits_every_round_without_early_stopping() {
        let (x, y) = separable();
        let model = GradientBoostedClassifier::fit(&x, &y, HyperParams::default(), None).unwrap();
        assert_eq!(model.n_trees(), 100);
        assert_eq!(model.best_iteration(), None);
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn probabilities_move_towards_labels() {
        let (x, y) = separable();
        let model = GradientBoostedClassifier::fit(&x, &y, HyperParams::default(), None).unwrap();
        let probs = model.predict_proba(&x).unwrap();
        assert!(probs[0] < 0.2 && probs[1] < 0.2);
        assert!(probs[2] > 0.8 && probs[3] > 0.8);
    }

    #[test]
    fn importance_concentrates_on_separating_feature() {
        let (x, y) = separable();
        let model = GradientBoostedClassifier::fit(&x, &y, HyperParams::default(), None).unwrap();
        let importances = model.feature_importances();
        assert_eq!(importances[0].0, "f0");
        assert!(importances[0].1 > 0.99);
    }

    #[test]
    fn wrong_width_is_a_prediction_error() {
        let (x, y) = separable();
        let model = GradientBoostedClassifier::fit(&x, &y, HyperParams::default(), None).unwrap();
        let narrow = FeatureMatrix::unnamed(vec![vec![1.0]]).unwrap();
        assert!(matches!(model.predict(&narrow), Err(ModelError::Prediction(_))));
    }

    #[test]
    fn single_class_training_predicts_that_class() {
        let x = FeatureMatrix::unnamed(vec![vec![0.0], vec![1.0], vec![2.0]]).unwrap();
        let y = LabelVector::new(vec![1, 1, 1]).unwrap();
        let model = GradientBoostedClassifier::fit(&x, &y, HyperParams::default(), None).unwrap();
        assert_eq!(model.predict(&x).unwrap().as_slice(), &[1, 1, 1]);
    }

    #[test]
    fn overflowing_margins_are_a_training_error() {
        // Unregularized leaves sit at +/-2, so one shrunken round overflows.
        let x = FeatureMatrix::unnamed(vec![vec![0.0], vec![1.0]]).unwrap();
        let y = LabelVector::new(vec![0, 1]).unwrap();
        let params = HyperParams {
            learning_rate: 1e308,
            reg_lambda: 0.0,
            ..HyperParams::default()
        };
        let err = GradientBoostedClassifier::fit(&x, &y, params, None).unwrap_err();
        match err {
            ModelError::Training(msg) => assert!(msg.contains("round 0"), "{msg}"),
            other => panic!("expected a training error, got {other:?}"),
        }
    }

    #[test]
    fn subsampling_is_seeded() {
        let x = FeatureMatrix::unnamed((0..40).map(|i| vec![i as f64, (i % 7) as f64]).collect())
            .unwrap();
        let y = LabelVector::from_bools((0..40).map(|i| i >= 20));
        let params = HyperParams {
            subsample: 0.5,
            colsample_bytree: 0.5,
            ..HyperParams::default()
        };
        let a = GradientBoostedClassifier::fit(&x, &y, params.clone(), None).unwrap();
        let b = GradientBoostedClassifier::fit(&x, &y, params, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sample_indices_respects_fraction() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(sample_indices(&mut rng, 5, 1.0), vec![0, 1, 2, 3, 4]);
        let half = sample_indices(&mut rng, 10, 0.5);
        assert_eq!(half.len(), 5);
        assert!(half.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sample_indices(&mut rng, 10, 0.01).len(), 1);
    }
}
