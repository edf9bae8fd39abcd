// ============================================================
// Layer 3 — Confusion Matrix
// ============================================================
// Accumulates (prediction, truth) pairs into a count matrix
// and derives per-class precision, recall and specificity.
//
// Axis convention:
//   matrix[predicted][true]
//   row i    = everything the model called class i
//   column j = everything that really is class j
//
// For class i:
//   TP = matrix[i][i]
//   FP = row_sum(i)    - TP   (called i, was something else)
//   FN = column_sum(i) - TP   (was i, called something else)
//   TN = total - TP - FP - FN
//
// Metrics are computed from the final integer counts in one
// shot, so streaming many batches through `update` never
// accumulates floating-point error.
//
// The heat-map rendering lives in infra/render.rs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Counts indexed as [predicted][true]
    matrix: Vec<Vec<u64>>,

    /// Display name for each class index
    labels: Vec<String>,
}

impl ConfusionMatrix {
    /// Create an empty matrix; `labels.len()` is the number of classes.
    pub fn new(labels: Vec<String>) -> Self {
        let n = labels.len();
        Self { matrix: vec![vec![0; n]; n], labels }
    }

    /// Create an empty matrix with labels "0", "1", ...
    pub fn with_classes(num_classes: usize) -> Self {
        Self::new((0..num_classes).map(|i| i.to_string()).collect())
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Count at [predicted][truth].
    pub fn count(&self, predicted: usize, truth: usize) -> u64 {
        self.matrix[predicted][truth]
    }

    pub fn rows(&self) -> &[Vec<u64>] {
        &self.matrix
    }

    pub fn total(&self) -> u64 {
        self.matrix.iter().flatten().sum()
    }

    /// Largest single cell, used for the render contrast threshold.
    pub fn max_count(&self) -> u64 {
        self.matrix.iter().flatten().copied().max().unwrap_or(0)
    }

    /// Add one observation per (prediction, truth) pair.
    ///
    /// The whole call is validated before any cell changes, so a
    /// failing call leaves the matrix exactly as it was.
    pub fn update(&mut self, predictions: &[usize], truths: &[usize]) -> Result<(), CoreError> {
        if predictions.len() != truths.len() {
            return Err(CoreError::LengthMismatch {
                predictions: predictions.len(),
                truths:      truths.len(),
            });
        }
        let n = self.num_classes();
        if let Some(&label) = predictions.iter().chain(truths).find(|&&l| l >= n) {
            return Err(CoreError::InvalidLabel { label, num_classes: n });
        }

        for (&p, &t) in predictions.iter().zip(truths) {
            self.matrix[p][t] += 1;
        }
        Ok(())
    }

    /// Overall accuracy plus a per-class metrics table.
    pub fn summary(&self) -> ConfusionSummary {
        let total   = self.total();
        let correct: u64 = (0..self.num_classes()).map(|i| self.matrix[i][i]).sum();
        let accuracy = ratio(correct, total);

        let per_class = (0..self.num_classes())
            .map(|i| {
                let tp       = self.matrix[i][i];
                let row_sum: u64 = self.matrix[i].iter().sum();
                let col_sum: u64 = self.matrix.iter().map(|row| row[i]).sum();
                let fp = row_sum - tp;
                let fn_ = col_sum - tp;
                let tn = total - tp - fp - fn_;
                ClassMetrics {
                    label:       self.labels[i].clone(),
                    precision:   round3(ratio(tp, tp + fp)),
                    recall:      round3(ratio(tp, tp + fn_)),
                    specificity: round3(ratio(tn, tn + fp)),
                }
            })
            .collect();

        ConfusionSummary { accuracy, total, per_class }
    }
}

/// Guarded division: 0.0 when the denominator is zero.
fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Metrics for one class treated as "positive".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label:       String,
    pub precision:   f64,
    pub recall:      f64,
    pub specificity: f64,
}

/// Output of `ConfusionMatrix::summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionSummary {
    /// trace / total, or 0.0 when nothing was recorded
    pub accuracy:  f64,
    pub total:     u64,
    pub per_class: Vec<ClassMetrics>,
}

impl ConfusionSummary {
    /// True when the matrix held no observations.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl fmt::Display for ConfusionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            writeln!(f, "the model accuracy is n/a (no samples evaluated)")?;
        } else {
            writeln!(f, "the model accuracy is {:.4}", self.accuracy)?;
        }

        let width = self
            .per_class
            .iter()
            .map(|c| c.label.chars().count())
            .max()
            .unwrap_or(0)
            .max(5);

        writeln!(f, "{:<width$} | {:>9} | {:>6} | {:>11}", "", "Precision", "Recall", "Specificity")?;
        writeln!(f, "{}", "-".repeat(width + 36))?;
        for c in &self.per_class {
            writeln!(
                f,
                "{:<width$} | {:>9.3} | {:>6.3} | {:>11.3}",
                c.label, c.precision, c.recall, c.specificity
            )?;
        }
        Ok(())
    }
}
