//! Integration tests for the experiment runner.
//!
//! Bars are synthesized, written through `CsvBarStore` into a temp dir, and
//! driven through the full fetch → features → split → fit → evaluate cycle.

use chrono::{Duration, NaiveDate};
use movelab_core::{
    ClassificationReport, ConfusionMatrix, Evaluator, JsonModelStore, ModelStore, ReportSink,
    TracingSink,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use movelab_runner::split::test_rows_for;
use movelab_runner::{
    dataset_hash, evaluate_saved_model, load_result, run_experiment, save_result, Bar,
    BarSource, CsvBarStore, DataError, ExperimentConfig, FeatureBuilder, Gate, OhlcvFeatures,
    RunError,
};

fn synthetic_bars(n: usize) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let mut close = 100.0;
    (0..n)
        .map(|i| {
            let open = close;
            let drift = 0.01 * (i as f64 * 0.3).sin() + 0.004 * ((i * 7 % 11) as f64 - 5.0) / 5.0;
            close = open * (1.0 + drift);
            Bar {
                date: start + Duration::days(i as i64),
                open,
                high: open.max(close) * 1.004,
                low: open.min(close) * 0.996,
                close,
                volume: 1_000_000.0 + ((i * 37) % 101) as f64 * 5_000.0,
            }
        })
        .collect()
}

fn fixture(n: usize) -> (tempfile::TempDir, CsvBarStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvBarStore::new(dir.path().join("raw"));
    store.write("AAPL", &synthetic_bars(n)).unwrap();
    (dir, store)
}

fn quiet_evaluator() -> Evaluator {
    Evaluator::with_sink(Box::new(TracingSink))
}

fn config_for(store: &CsvBarStore) -> ExperimentConfig {
    let mut config = ExperimentConfig::for_ticker("AAPL", store.dir());
    config.model.n_estimators = Some(30);
    config.report.verbose = false;
    config
}

#[test]
fn full_experiment_reports_consistent_counts() {
    let (_dir, store) = fixture(200);
    let config = config_for(&store);
    let builder = OhlcvFeatures::new(config.features.horizon);

    let result = run_experiment(&config, &store, &builder, &quiet_evaluator()).unwrap();

    let rows = 200 - builder.warmup() - config.features.horizon;
    assert_eq!(result.ticker, "AAPL");
    assert_eq!(result.bar_count, 200);
    assert_eq!(result.train_rows + result.test_rows, rows);
    assert_eq!(result.test_rows, test_rows_for(rows, 0.2));
    assert_eq!(result.validation_rows, 0);
    assert_eq!(result.confusion.total(), result.test_rows);
    assert_eq!(result.n_trees, 30);
    assert!(result.first_date < result.test_start);
    assert!(result.test_start <= result.last_date);
    assert!(result.gate.is_none());
    assert!(result.gate_passed());

    for v in result.metrics.as_map().values() {
        assert!((0.0..=1.0).contains(v));
    }
    let total: f64 = result.feature_importances.iter().map(|(_, g)| g).sum();
    assert!(total == 0.0 || (total - 1.0).abs() < 1e-9);
    let gains: Vec<f64> = result.feature_importances.iter().map(|(_, g)| *g).collect();
    assert!(gains.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn experiment_is_reproducible() {
    let (_dir, store) = fixture(150);
    let config = config_for(&store);
    let builder = OhlcvFeatures::default();

    let a = run_experiment(&config, &store, &builder, &quiet_evaluator()).unwrap();
    let b = run_experiment(&config, &store, &builder, &quiet_evaluator()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.dataset_hash, dataset_hash(&store.read("AAPL").unwrap()));
}

#[test]
fn dataset_hash_tracks_bar_content() {
    let bars = synthetic_bars(40);
    let mut changed = bars.clone();
    changed[10].volume += 1.0;
    assert_eq!(dataset_hash(&bars), dataset_hash(&bars.clone()));
    assert_ne!(dataset_hash(&bars), dataset_hash(&changed));
}

#[test]
fn model_is_persisted_and_rescored() {
    let (dir, store) = fixture(180);
    let model_path = dir.path().join("models/aapl.json");
    let mut config = config_for(&store);
    config.output.model_path = Some(model_path.clone());
    let builder = OhlcvFeatures::default();
    let evaluator = quiet_evaluator();

    let result = run_experiment(&config, &store, &builder, &evaluator).unwrap();
    assert_eq!(result.model_path.as_deref(), Some(model_path.as_path()));

    let model = JsonModelStore.load(&model_path).unwrap();
    assert_eq!(model.n_trees(), result.n_trees);

    // Rescoring on exactly the test window reproduces the experiment metrics.
    let rescored = evaluate_saved_model(
        &model_path,
        "AAPL",
        None,
        None,
        &store,
        &builder,
        &evaluator,
        false,
    )
    .unwrap();
    assert_eq!(rescored.confusion.total(), result.train_rows + result.test_rows);

    let bars = store.fetch("AAPL", None, None).unwrap();
    let data = builder.build(&bars).unwrap();
    let cut = data.len() - result.test_rows;
    let idx: Vec<usize> = (cut..data.len()).collect();
    let test_x = data.x.select_rows(&idx);
    let test_y = data.y.select(&idx);
    let metrics = evaluator.evaluate(&model, &test_x, &test_y, false).unwrap();
    assert_eq!(metrics, result.metrics);
}

/// Counts how many verbose reports reach it.
struct CountingSink(Arc<AtomicUsize>);

impl ReportSink for CountingSink {
    fn emit(&self, _report: &ClassificationReport, _confusion: &ConfusionMatrix) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn verbose_flag_alone_decides_whether_the_report_is_emitted() {
    let (dir, store) = fixture(150);
    let model_path = dir.path().join("model.json");
    let mut config = config_for(&store);
    config.output.model_path = Some(model_path.clone());
    let builder = OhlcvFeatures::default();
    run_experiment(&config, &store, &builder, &quiet_evaluator()).unwrap();

    let emitted = Arc::new(AtomicUsize::new(0));
    let evaluator = Evaluator::with_sink(Box::new(CountingSink(Arc::clone(&emitted))));
    let quiet = evaluate_saved_model(
        &model_path, "AAPL", None, None, &store, &builder, &evaluator, false,
    )
    .unwrap();
    assert_eq!(emitted.load(Ordering::SeqCst), 0);

    let loud = evaluate_saved_model(
        &model_path, "AAPL", None, None, &store, &builder, &evaluator, true,
    )
    .unwrap();
    assert_eq!(emitted.load(Ordering::SeqCst), 1);
    assert_eq!(quiet.metrics, loud.metrics);
}

#[test]
fn result_round_trips_through_json() {
    let (dir, store) = fixture(120);
    let config = config_for(&store);
    let result =
        run_experiment(&config, &store, &OhlcvFeatures::default(), &quiet_evaluator()).unwrap();

    let path = dir.path().join("results/nested/aapl.json");
    save_result(&result, &path).unwrap();
    assert!(path.exists());
    assert!(!path.with_file_name("aapl.json.tmp").exists());
    assert_eq!(load_result(&path).unwrap(), result);
}

#[test]
fn gate_outcome_is_attached() {
    let (_dir, store) = fixture(150);
    let mut config = config_for(&store);
    config.gate = Some(Gate {
        min_accuracy: Some(0.0),
        min_precision: Some(0.0),
        min_recall: None,
        min_f1: None,
    });

    let result =
        run_experiment(&config, &store, &OhlcvFeatures::default(), &quiet_evaluator()).unwrap();
    let gate = result.gate.as_ref().unwrap();
    assert!(gate.passed);
    assert!(gate.failures.is_empty());
}

#[test]
fn early_stopping_uses_validation_tail() {
    let (_dir, store) = fixture(200);
    let mut config = config_for(&store);
    config.split.validation_fraction = 0.25;
    config.model.n_estimators = Some(100);
    config.model.early_stopping_rounds = Some(3);

    let result =
        run_experiment(&config, &store, &OhlcvFeatures::default(), &quiet_evaluator()).unwrap();
    assert!(result.validation_rows > 0);
    assert!(result.n_trees <= 100);
    assert_eq!(result.params.early_stopping_rounds, Some(3));
}

#[test]
fn empty_date_range_is_a_data_error() {
    let (_dir, store) = fixture(100);
    let mut config = config_for(&store);
    config.data.start = NaiveDate::from_ymd_opt(2030, 1, 1);

    let err =
        run_experiment(&config, &store, &OhlcvFeatures::default(), &quiet_evaluator()).unwrap_err();
    assert!(matches!(err, RunError::Data(DataError::NoData { .. })));
}

#[test]
fn short_history_is_a_feature_error() {
    let (_dir, store) = fixture(15);
    let config = config_for(&store);
    let err =
        run_experiment(&config, &store, &OhlcvFeatures::default(), &quiet_evaluator()).unwrap_err();
    assert!(matches!(err, RunError::Features(_)));
}

#[test]
fn invalid_config_is_rejected_before_loading() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvBarStore::new(dir.path());
    let mut config = config_for(&store);
    config.split.test_fraction = 0.0;

    let err =
        run_experiment(&config, &store, &OhlcvFeatures::default(), &quiet_evaluator()).unwrap_err();
    assert!(matches!(err, RunError::Config(_)));
}
