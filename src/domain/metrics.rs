// ============================================================
// Layer 3 — Training Metrics Domain Types
// ============================================================
// Records produced by the training loop:
//   - PassStats:    loss/accuracy of one pass over one subset
//   - EpochMetrics: one (fold, epoch) row, immutable once built
//   - FoldHistory:  every epoch of one fold, in epoch order
//   - FoldSummary:  mean/std of the final epochs across folds

use serde::{Deserialize, Serialize};

/// Mean loss and accuracy of one pass (train or validation).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassStats {
    pub loss:     f64,
    pub accuracy: f64,
}

impl PassStats {
    pub fn new(loss: f64, accuracy: f64) -> Self {
        Self { loss, accuracy }
    }
}

/// One row of metrics for a single (fold, epoch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number within its fold (starts at 1)
    pub epoch: usize,

    /// Average cross-entropy loss over the training batches
    pub train_loss: f64,

    /// Fraction of training samples classified correctly
    pub train_accuracy: f64,

    /// Average cross-entropy loss on the validation subset
    pub val_loss: f64,

    /// Fraction of validation samples classified correctly
    pub val_accuracy: f64,

    /// Learning rate applied during this epoch's training pass
    pub learning_rate: f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train: PassStats, val: PassStats, learning_rate: f64) -> Self {
        Self {
            epoch,
            train_loss:     train.loss,
            train_accuracy: train.accuracy,
            val_loss:       val.loss,
            val_accuracy:   val.accuracy,
            learning_rate,
        }
    }

    /// Scalars in the order they are streamed to a metrics sink.
    pub fn scalars(&self) -> [(&'static str, f64); 6] {
        [
            ("epoch",         self.epoch as f64),
            ("train_loss",    self.train_loss),
            ("train_acc",     self.train_accuracy),
            ("val_loss",      self.val_loss),
            ("val_acc",       self.val_accuracy),
            ("learning_rate", self.learning_rate),
        ]
    }
}

/// All epochs of one fold, tagged by 1-based fold number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldHistory {
    pub fold:   usize,
    pub epochs: Vec<EpochMetrics>,
}

impl FoldHistory {
    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }
}

/// Which validation figure decides the "best" fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMetric {
    /// Higher validation accuracy wins
    ValAccuracy,
    /// Lower validation loss wins
    ValLoss,
}

impl SelectionMetric {
    pub fn value(&self, m: &EpochMetrics) -> f64 {
        match self {
            SelectionMetric::ValAccuracy => m.val_accuracy,
            SelectionMetric::ValLoss     => m.val_loss,
        }
    }

    /// Returns true if `candidate` beats `best` under this metric.
    pub fn is_improvement(&self, candidate: f64, best: f64) -> bool {
        match self {
            SelectionMetric::ValAccuracy => candidate > best,
            SelectionMetric::ValLoss     => candidate < best,
        }
    }
}

/// Cross-fold aggregate of each fold's final epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldSummary {
    pub folds:             usize,
    pub mean_val_accuracy: f64,
    pub std_val_accuracy:  f64,
    pub mean_val_loss:     f64,
    pub std_val_loss:      f64,
}

impl FoldSummary {
    /// Aggregate the last epoch of every fold. Folds without epochs are skipped.
    pub fn from_histories(histories: &[FoldHistory]) -> Self {
        let finals: Vec<&EpochMetrics> = histories.iter().filter_map(FoldHistory::last).collect();
        let accs: Vec<f64>  = finals.iter().map(|m| m.val_accuracy).collect();
        let losses: Vec<f64> = finals.iter().map(|m| m.val_loss).collect();
        let (mean_val_accuracy, std_val_accuracy) = mean_std(&accs);
        let (mean_val_loss, std_val_loss)         = mean_std(&losses);
        Self {
            folds: finals.len(),
            mean_val_accuracy,
            std_val_accuracy,
            mean_val_loss,
            std_val_loss,
        }
    }
}

/// Population mean and standard deviation; (0, 0) for an empty slice.
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n    = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var  = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
