//! Metric thresholds a model must clear before its signals are worth
//! backtesting.

use movelab_core::MetricsReport;
use serde::{Deserialize, Serialize};

/// Minimum acceptable metrics. Unset thresholds are not checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Gate {
    pub min_accuracy: Option<f64>,
    pub min_precision: Option<f64>,
    pub min_recall: Option<f64>,
    pub min_f1: Option<f64>,
}

/// Result of checking a [`MetricsReport`] against a [`Gate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub passed: bool,
    /// One line per failed threshold, e.g. `precision 0.4200 < 0.5000`.
    pub failures: Vec<String>,
}

impl Gate {
    fn thresholds(&self) -> [(&'static str, Option<f64>); 4] {
        [
            ("accuracy", self.min_accuracy),
            ("precision", self.min_precision),
            ("recall", self.min_recall),
            ("f1_score", self.min_f1),
        ]
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, min) in self.thresholds() {
            if let Some(v) = min {
                if !(0.0..=1.0).contains(&v) {
                    return Err(format!("gate.min_{name} must be in [0, 1], got {v}"));
                }
            }
        }
        Ok(())
    }

    pub fn check(&self, metrics: &MetricsReport) -> GateOutcome {
        let actual = metrics.as_map();
        let failures: Vec<String> = self
            .thresholds()
            .into_iter()
            .filter_map(|(name, min)| {
                let min = min?;
                let value = actual.get(name).copied().unwrap_or(0.0);
                (value < min).then(|| format!("{name} {value:.4} < {min:.4}"))
            })
            .collect();

        GateOutcome {
            passed: failures.is_empty(),
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(accuracy: f64, precision: f64, recall: f64, f1_score: f64) -> MetricsReport {
        MetricsReport {
            accuracy,
            precision,
            recall,
            f1_score,
        }
    }

    #[test]
    fn empty_gate_always_passes() {
        let out = Gate::default().check(&report(0.0, 0.0, 0.0, 0.0));
        assert!(out.passed);
        assert!(out.failures.is_empty());
    }

    #[test]
    fn reports_each_failed_threshold() {
        let gate = Gate {
            min_accuracy: Some(0.55),
            min_precision: Some(0.5),
            min_recall: Some(0.3),
            min_f1: None,
        };
        let out = gate.check(&report(0.60, 0.42, 0.10, 0.0));
        assert!(!out.passed);
        assert_eq!(
            out.failures,
            vec!["precision 0.4200 < 0.5000", "recall 0.1000 < 0.3000"]
        );
    }

    #[test]
    fn threshold_is_inclusive() {
        let gate = Gate {
            min_accuracy: Some(0.5),
            ..Default::default()
        };
        assert!(gate.check(&report(0.5, 0.0, 0.0, 0.0)).passed);
    }

    #[test]
    fn out_of_range_threshold_is_invalid() {
        let gate = Gate {
            min_f1: Some(-0.1),
            ..Default::default()
        };
        assert!(gate.validate().is_err());
    }
}
