//! Serializable experiment configuration.
//!
//! One TOML file describes a full experiment: which bars to load, how to
//! label them, how to split, model overrides, where to write artifacts, and
//! an optional quality gate.

use chrono::NaiveDate;
use movelab_core::{HyperParams, ParamOverrides};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::gate::Gate;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level experiment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    pub data: DataConfig,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub split: SplitConfig,

    /// Overrides on top of the model defaults.
    #[serde(default)]
    pub model: ParamOverrides,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub report: ReportConfig,

    pub gate: Option<Gate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    pub ticker: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// First bar date (inclusive).
    pub start: Option<NaiveDate>,

    /// Last bar date (inclusive).
    pub end: Option<NaiveDate>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureConfig {
    /// Bars ahead the label compares against.
    #[serde(default = "default_horizon")]
    pub horizon: usize,
}

fn default_horizon() -> usize {
    1
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitConfig {
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    /// Tail of the training rows held out for early stopping. Zero disables.
    #[serde(default)]
    pub validation_fraction: f64,
}

fn default_test_fraction() -> f64 {
    0.2
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            validation_fraction: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub model_path: Option<PathBuf>,
    pub metrics_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Print the classification report and confusion matrix after evaluation.
    #[serde(default = "default_verbose")]
    pub verbose: bool,
}

fn default_verbose() -> bool {
    true
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            verbose: default_verbose(),
        }
    }
}

impl ExperimentConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Minimal config for a ticker with every other section defaulted.
    pub fn for_ticker(ticker: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data: DataConfig {
                ticker: ticker.into(),
                data_dir: data_dir.into(),
                start: None,
                end: None,
            },
            features: FeatureConfig::default(),
            split: SplitConfig::default(),
            model: ParamOverrides::default(),
            output: OutputConfig::default(),
            report: ReportConfig::default(),
            gate: None,
        }
    }

    /// Model parameters after applying `[model]` overrides to the defaults.
    pub fn hyper_params(&self) -> Result<HyperParams, ConfigError> {
        HyperParams::resolve(Some(&self.model)).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.data.ticker.trim().is_empty() {
            return invalid("data.ticker must not be empty".into());
        }
        if let (Some(start), Some(end)) = (self.data.start, self.data.end) {
            if start > end {
                return invalid(format!("data.start {start} is after data.end {end}"));
            }
        }
        if self.features.horizon == 0 {
            return invalid("features.horizon must be at least 1".into());
        }

        let tf = self.split.test_fraction;
        if !(tf > 0.0 && tf < 1.0) {
            return invalid(format!("split.test_fraction must be in (0, 1), got {tf}"));
        }
        let vf = self.split.validation_fraction;
        if !(0.0..1.0).contains(&vf) {
            return invalid(format!(
                "split.validation_fraction must be in [0, 1), got {vf}"
            ));
        }

        let params = self.hyper_params()?;
        if params.early_stopping_rounds.is_some() && vf == 0.0 {
            return invalid(
                "model.early_stopping_rounds needs split.validation_fraction > 0".into(),
            );
        }

        if let Some(gate) = &self.gate {
            gate.validate().map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[data]
ticker = "AAPL"
data_dir = "data/raw"
start = "2023-01-01"
end = "2023-06-01"

[features]
horizon = 1

[split]
test_fraction = 0.2

[model]
max_depth = 5

[output]
model_path = "models/aapl.json"
metrics_path = "results/aapl.json"

[gate]
min_accuracy = 0.55
min_precision = 0.5
"#;

    #[test]
    fn parses_full_config() {
        let config = ExperimentConfig::from_toml(FULL).unwrap();
        assert_eq!(config.data.ticker, "AAPL");
        assert_eq!(config.data.start, NaiveDate::from_ymd_opt(2023, 1, 1));
        assert_eq!(config.model.max_depth, Some(5));
        assert_eq!(
            config.output.model_path.as_deref(),
            Some(Path::new("models/aapl.json"))
        );
        let gate = config.gate.as_ref().unwrap();
        assert_eq!(gate.min_accuracy, Some(0.55));
        assert_eq!(gate.min_recall, None);

        let params = config.hyper_params().unwrap();
        assert_eq!(params.max_depth, 5);
        assert_eq!(params.learning_rate, 0.1);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = ExperimentConfig::from_toml("[data]\nticker = \"SPY\"\n").unwrap();
        assert_eq!(config.data.data_dir, PathBuf::from("data/raw"));
        assert_eq!(config.features.horizon, 1);
        assert_eq!(config.split.test_fraction, 0.2);
        assert!(config.model.is_empty());
        assert!(config.report.verbose);
        assert!(config.gate.is_none());
        assert_eq!(config, ExperimentConfig::for_ticker("SPY", "data/raw"));
    }

    #[test]
    fn unknown_model_key_is_a_parse_error() {
        let toml = "[data]\nticker = \"SPY\"\n[model]\nmax_dpth = 4\n";
        assert!(matches!(
            ExperimentConfig::from_toml(toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn inverted_dates_are_invalid() {
        let toml = "[data]\nticker = \"SPY\"\nstart = \"2024-01-01\"\nend = \"2023-01-01\"\n";
        assert!(matches!(
            ExperimentConfig::from_toml(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn bad_values_are_invalid() {
        let cases = [
            "[data]\nticker = \"\"\n",
            "[data]\nticker = \"SPY\"\n[features]\nhorizon = 0\n",
            "[data]\nticker = \"SPY\"\n[split]\ntest_fraction = 1.0\n",
            "[data]\nticker = \"SPY\"\n[model]\nlearning_rate = 0.0\n",
            "[data]\nticker = \"SPY\"\n[model]\nearly_stopping_rounds = 5\n",
            "[data]\nticker = \"SPY\"\n[gate]\nmin_accuracy = 1.5\n",
        ];
        for toml in cases {
            assert!(
                matches!(ExperimentConfig::from_toml(toml), Err(ConfigError::Invalid(_))),
                "expected invalid: {toml}"
            );
        }
    }

    #[test]
    fn early_stopping_with_validation_tail_is_valid() {
        let toml = "[data]\nticker = \"SPY\"\n[split]\nvalidation_fraction = 0.2\n[model]\nearly_stopping_rounds = 5\n";
        let config = ExperimentConfig::from_toml(toml).unwrap();
        assert_eq!(config.hyper_params().unwrap().early_stopping_rounds, Some(5));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ExperimentConfig::from_file(Path::new("/nonexistent/movelab.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
