//! MoveLab Runner: experiment orchestration around `movelab-core`.
//!
//! This crate provides:
//! - Daily bar loading through the `BarSource` trait (CSV store included)
//! - Polygon.io downloads into the CSV store, behind a circuit breaker
//! - OHLCV feature engineering with forward-looking "up move" labels
//! - Chronological train/test splitting
//! - TOML experiment configuration
//! - Metric gating and JSON experiment results

pub mod bars;
pub mod circuit_breaker;
pub mod config;
pub mod download;
pub mod experiment;
pub mod features;
pub mod gate;
pub mod polygon;
pub mod split;

pub use bars::{Bar, BarSource, CsvBarStore, DataError};
pub use circuit_breaker::CircuitBreaker;
pub use config::{ConfigError, ExperimentConfig};
pub use download::{download_ticker, download_tickers, DownloadSummary};
pub use experiment::{
    dataset_hash, evaluate_saved_model, load_result, run_experiment, save_result,
    ExperimentResult, RunError,
};
pub use features::{FeatureBuilder, FeatureError, LabeledData, OhlcvFeatures};
pub use gate::{Gate, GateOutcome};
pub use polygon::PolygonSource;
pub use split::{train_test_split, Partition, SplitError, TrainTestSplit};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn bar_types_are_send_sync() {
        assert_send::<Bar>();
        assert_sync::<Bar>();
        assert_send::<CsvBarStore>();
        assert_sync::<CsvBarStore>();
        assert_send::<PolygonSource>();
        assert_sync::<PolygonSource>();
        assert_send::<CircuitBreaker>();
        assert_sync::<CircuitBreaker>();
    }

    #[test]
    fn dataset_types_are_send_sync() {
        assert_send::<LabeledData>();
        assert_sync::<LabeledData>();
        assert_send::<TrainTestSplit>();
        assert_sync::<TrainTestSplit>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<ExperimentConfig>();
        assert_sync::<ExperimentConfig>();
        assert_send::<Gate>();
        assert_sync::<Gate>();
    }

    #[test]
    fn experiment_result_is_send_sync() {
        assert_send::<ExperimentResult>();
        assert_sync::<ExperimentResult>();
    }
}
