use std::fmt;

use serde::{Deserialize, Serialize};

/// Precision, recall and F1 of one class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub not_trending: ClassMetrics,
    pub trending: ClassMetrics,
    pub accuracy: f64,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn class_metrics(actual: &[bool], predicted: &[bool], class: bool) -> ClassMetrics {
    let pairs = || actual.iter().zip(predicted.iter());
    let true_positive = pairs().filter(|&(&a, &p)| a == class && p == class).count();
    let predicted_positive = predicted.iter().filter(|&&p| p == class).count();
    let support = actual.iter().filter(|&&a| a == class).count();

    let precision = ratio(true_positive, predicted_positive);
    let recall = ratio(true_positive, support);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    ClassMetrics {
        precision,
        recall,
        f1,
        support,
    }
}

/// F1 of the trending class. Undefined precision or recall counts as 0.
pub fn f1_score(actual: &[bool], predicted: &[bool]) -> f64 {
    class_metrics(actual, predicted, true).f1
}

impl ClassificationReport {
    pub fn new(actual: &[bool], predicted: &[bool]) -> Self {
        let correct = actual
            .iter()
            .zip(predicted.iter())
            .filter(|(a, p)| a == p)
            .count();

        ClassificationReport {
            not_trending: class_metrics(actual, predicted, false),
            trending: class_metrics(actual, predicted, true),
            accuracy: ratio(correct, actual.len()),
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
        for (name, m) in [("not trending", &self.not_trending), ("trending", &self.trending)] {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        write!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.not_trending.support + self.trending.support
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let actual = [true, true, false, false, false];
        let predicted = [true, false, true, false, false];

        let report = ClassificationReport::new(&actual, &predicted);

        assert_eq!(report.trending.support, 2);
        assert_eq!(report.not_trending.support, 3);
        assert!((report.trending.precision - 0.5).abs() < 1e-12);
        assert!((report.trending.recall - 0.5).abs() < 1e-12);
        assert!((report.not_trending.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.accuracy - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_no_positive_predictions_gives_zero_f1() {
        assert_eq!(f1_score(&[true, false], &[false, false]), 0.0);
    }

    #[test]
    fn test_perfect_predictions() {
        let labels = [true, false, true];
        assert_eq!(f1_score(&labels, &labels), 1.0);
        assert!(ClassificationReport::new(&labels, &labels)
            .to_string()
            .contains("accuracy"));
    }
}
