//! Experiment runner: bars → features → split → fit → evaluate → gate.
//!
//! Two entry points:
//! - `run_experiment()`: full train/evaluate cycle from an `ExperimentConfig`.
//! - `evaluate_saved_model()`: score a persisted model on fresh bars.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use movelab_core::persist::write_atomic;
use movelab_core::{
    ConfusionMatrix, Evaluation, Evaluator, HyperParams, JsonModelStore, ModelError, ModelStore,
    MetricsReport, PersistError, Trainer,
};

use crate::bars::{Bar, BarSource, DataError};
use crate::config::{ConfigError, ExperimentConfig};
use crate::features::{FeatureBuilder, FeatureError};
use crate::gate::GateOutcome;
use crate::split::{train_test_split, SplitError};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("feature error: {0}")]
    Features(#[from] FeatureError),
    #[error("split error: {0}")]
    Split(#[from] SplitError),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("model file error: {0}")]
    Persist(#[from] PersistError),
    #[error("model expects features {expected:?}, data has {actual:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },
}

/// Current schema version for persisted experiment results.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub ticker: String,
    pub bar_count: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    /// BLAKE3 hex digest of the bars the experiment ran on.
    pub dataset_hash: String,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub test_rows: usize,
    /// First date of the test partition; everything before it was trainable.
    pub test_start: NaiveDate,
    pub params: HyperParams,
    pub n_trees: usize,
    pub metrics: MetricsReport,
    pub confusion: ConfusionMatrix,
    /// (feature name, normalized gain), highest first.
    pub feature_importances: Vec<(String, f64)>,
    pub gate: Option<GateOutcome>,
    pub model_path: Option<PathBuf>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl ExperimentResult {
    /// False only when a gate was configured and failed.
    pub fn gate_passed(&self) -> bool {
        self.gate.as_ref().map_or(true, |g| g.passed)
    }
}

/// BLAKE3 over every bar's date and OHLCV bit patterns, in order.
pub fn dataset_hash(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(bar.date.to_string().as_bytes());
        for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
            hasher.update(&v.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Run a full experiment as described by `config`.
///
/// The model is persisted to `output.model_path` when set. The result is
/// returned, not written; see [`save_result`].
pub fn run_experiment(
    config: &ExperimentConfig,
    source: &dyn BarSource,
    builder: &dyn FeatureBuilder,
    evaluator: &Evaluator,
) -> Result<ExperimentResult, RunError> {
    config.validate()?;
    let ticker = config.data.ticker.as_str();

    let bars = source.fetch(ticker, config.data.start, config.data.end)?;
    let hash = dataset_hash(&bars);
    info!(
        ticker,
        source = source.name(),
        bars = bars.len(),
        dataset_hash = %&hash[..12],
        "loaded bars"
    );

    let data = builder.build(&bars)?;
    let split = train_test_split(&data, config.split.test_fraction)?;
    info!(
        features = builder.name(),
        rows = data.len(),
        train = split.train.len(),
        test = split.test.len(),
        positive_rate = data.positive_rate(),
        "built dataset"
    );

    let trainer = Trainer::new();
    let model_path = config.output.model_path.as_deref();
    let (model, validation_rows) = if config.split.validation_fraction > 0.0 {
        let (fit, val) = split.train.split_tail(config.split.validation_fraction)?;
        let model = trainer.fit_with_eval(
            &fit.x,
            &fit.y,
            &val.x,
            &val.y,
            Some(&config.model),
            model_path,
        )?;
        (model, val.len())
    } else {
        let model = trainer.fit(&split.train.x, &split.train.y, Some(&config.model), model_path)?;
        (model, 0)
    };

    let Evaluation {
        metrics, confusion, ..
    } = evaluator.evaluate_detailed(&model, &split.test.x, &split.test.y, config.report.verbose)?;

    let gate = config.gate.as_ref().map(|g| g.check(&metrics));
    if let Some(outcome) = &gate {
        if outcome.passed {
            info!(ticker, "gate passed");
        } else {
            warn!(ticker, failures = ?outcome.failures, "gate failed");
        }
    }

    let (first_date, last_date) = match (bars.first(), bars.last()) {
        (Some(f), Some(l)) => (f.date, l.date),
        _ => {
            return Err(DataError::NoData {
                ticker: ticker.to_string(),
            }
            .into())
        }
    };
    let test_start = split.test.first_date().unwrap_or(last_date);

    let mut feature_importances = model.feature_importances();
    feature_importances.sort_by(|a, b| b.1.total_cmp(&a.1));

    Ok(ExperimentResult {
        schema_version: SCHEMA_VERSION,
        ticker: ticker.to_string(),
        bar_count: bars.len(),
        first_date,
        last_date,
        dataset_hash: hash,
        train_rows: split.train.len() - validation_rows,
        validation_rows,
        test_rows: split.test.len(),
        test_start,
        params: model.params().clone(),
        n_trees: model.n_trees(),
        metrics,
        confusion,
        feature_importances,
        gate,
        model_path: config.output.model_path.clone(),
    })
}

/// Score a persisted model on every labeled row built from `ticker`'s bars.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_saved_model(
    model_path: &Path,
    ticker: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    source: &dyn BarSource,
    builder: &dyn FeatureBuilder,
    evaluator: &Evaluator,
    verbose: bool,
) -> Result<Evaluation, RunError> {
    let model = JsonModelStore.load(model_path)?;
    let bars = source.fetch(ticker, start, end)?;
    let data = builder.build(&bars)?;

    if model.feature_names() != data.x.feature_names() {
        return Err(RunError::FeatureMismatch {
            expected: model.feature_names().to_vec(),
            actual: data.x.feature_names().to_vec(),
        });
    }

    info!(
        ticker,
        model = %model_path.display(),
        rows = data.len(),
        "evaluating saved model"
    );
    Ok(evaluator.evaluate_detailed(&model, &data.x, &data.y, verbose)?)
}

/// Write `result` as pretty JSON, atomically.
pub fn save_result(result: &ExperimentResult, path: &Path) -> Result<(), RunError> {
    let json = serde_json::to_vec_pretty(result).map_err(PersistError::from)?;
    write_atomic(path, &json)?;
    info!(path = %path.display(), "saved experiment result");
    Ok(())
}

/// Read a result written by [`save_result`].
pub fn load_result(path: &Path) -> Result<ExperimentResult, RunError> {
    let bytes = std::fs::read(path).map_err(|source| PersistError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_slice(&bytes).map_err(PersistError::from)?)
}
