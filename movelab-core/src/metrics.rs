//! Classification metrics: pure functions over label slices.
//!
//! Zero-division policy: any ratio whose denominator is zero is 0.0. A test
//! split with no positive rows (or a model that never predicts positive)
//! therefore scores precision/recall/F1 of 0.0 instead of failing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 2×2 confusion matrix counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
    pub tp: usize,
}

impl ConfusionMatrix {
    /// Count outcomes. Slices are zipped; callers check lengths first.
    pub fn from_labels(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == 1, p == 1) {
                (true, true) => cm.tp += 1,
                (false, false) => cm.tn += 1,
                (false, true) => cm.fp += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Precision of the positive class.
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Recall of the positive class.
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        harmonic_mean(self.precision(), self.recall())
    }

    /// Per-class scores, class 0 first.
    pub fn class_scores(&self) -> [ClassScore; 2] {
        let negative = ClassScore {
            label: 0,
            precision: ratio(self.tn, self.tn + self.fn_),
            recall: ratio(self.tn, self.tn + self.fp),
            f1: 0.0,
            support: self.tn + self.fp,
        };
        let positive = ClassScore {
            label: 1,
            precision: self.precision(),
            recall: self.recall(),
            f1: 0.0,
            support: self.tp + self.fn_,
        };
        [negative, positive].map(|mut c| {
            c.f1 = harmonic_mean(c.precision, c.recall);
            c
        })
    }
}

impl fmt::Display for ConfusionMatrix {
    /// Rows are actual labels, columns are predicted labels.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.total().to_string().len().max(6);
        writeln!(f, "{:>10} {:>w$} {:>w$}", "", "pred 0", "pred 1")?;
        writeln!(f, "{:>10} {:>w$} {:>w$}", "actual 0", self.tn, self.fp)?;
        write!(f, "{:>10} {:>w$} {:>w$}", "actual 1", self.fn_, self.tp)
    }
}

/// Precision/recall/F1/support for one label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub label: u8,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class breakdown with macro and support-weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: [ClassScore; 2],
    pub accuracy: f64,
    pub macro_avg: ClassScore,
    pub weighted_avg: ClassScore,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let classes = cm.class_scores();
        let total = cm.total();

        let macro_avg = ClassScore {
            label: 0,
            precision: (classes[0].precision + classes[1].precision) / 2.0,
            recall: (classes[0].recall + classes[1].recall) / 2.0,
            f1: (classes[0].f1 + classes[1].f1) / 2.0,
            support: total,
        };

        let weighted = |pick: fn(&ClassScore) -> f64| -> f64 {
            if total == 0 {
                return 0.0;
            }
            classes
                .iter()
                .map(|c| pick(c) * c.support as f64)
                .sum::<f64>()
                / total as f64
        };
        let weighted_avg = ClassScore {
            label: 0,
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support: total,
        };

        Self {
            classes,
            accuracy: cm.accuracy(),
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, c) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, c.precision, c.recall, c.f1, c.support
            )?;
        }
        Ok(())
    }
}

/// Mean binary cross-entropy. Probabilities are clipped away from 0 and 1.
pub fn log_loss(y_true: &[u8], probs: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let eps = 1e-15;
    let total: f64 = y_true
        .iter()
        .zip(probs)
        .map(|(&t, &p)| {
            let p = p.clamp(eps, 1.0 - eps);
            if t == 1 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / y_true.len() as f64
}

/// Fraction of rows misclassified at the 0.5 probability threshold.
pub fn error_rate(y_true: &[u8], probs: &[f64]) -> f64 {
    let wrong = y_true
        .iter()
        .zip(probs)
        .filter(|(&t, &p)| (p > 0.5) != (t == 1))
        .count();
    ratio(wrong, y_true.len())
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

fn harmonic_mean(a: f64, b: f64) -> f64 {
    if a + b <= 0.0 {
        0.0
    } else {
        2.0 * a * b / (a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_all_four_cells() {
        let cm = ConfusionMatrix::from_labels(&[0, 0, 1, 1, 1], &[0, 1, 1, 0, 1]);
        assert_eq!(
            cm,
            ConfusionMatrix {
                tn: 1,
                fp: 1,
                fn_: 1,
                tp: 2
            }
        );
        assert!((cm.accuracy() - 0.6).abs() < 1e-12);
        assert!((cm.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.recall() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn all_negative_split_scores_zero_not_nan() {
        let cm = ConfusionMatrix::from_labels(&[0, 0, 0], &[0, 0, 0]);
        assert_eq!(cm.accuracy(), 1.0);
        assert_eq!(cm.precision(), 0.0);
        assert_eq!(cm.recall(), 0.0);
        assert_eq!(cm.f1(), 0.0);
    }

    #[test]
    fn report_weights_by_support() {
        let cm = ConfusionMatrix {
            tn: 3,
            fp: 1,
            fn_: 0,
            tp: 0,
        };
        let report = ClassificationReport::from_confusion(&cm);
        assert_eq!(report.classes[0].support, 4);
        assert_eq!(report.classes[1].support, 0);
        assert!((report.classes[0].recall - 0.75).abs() < 1e-12);
        // Class 1 has no support, so weighted recall equals class 0 recall.
        assert!((report.weighted_avg.recall - 0.75).abs() < 1e-12);
        assert!((report.macro_avg.recall - 0.375).abs() < 1e-12);
    }

    #[test]
    fn report_renders_both_classes() {
        let cm = ConfusionMatrix::from_labels(&[0, 1], &[0, 1]);
        let text = ClassificationReport::from_confusion(&cm).to_string();
        assert!(text.contains("precision"));
        assert!(text.contains("macro avg"));
        assert!(text.contains("weighted avg"));
        assert!(cm.to_string().contains("actual 1"));
    }

    #[test]
    fn log_loss_is_small_for_confident_correct_predictions() {
        assert!(log_loss(&[1, 0], &[0.99, 0.01]) < 0.02);
        assert!(log_loss(&[1, 0], &[0.01, 0.99]) > 4.0);
    }

    #[test]
    fn error_rate_uses_half_threshold() {
        assert_eq!(error_rate(&[1, 0, 1, 0], &[0.9, 0.1, 0.4, 0.6]), 0.5);
    }
}
