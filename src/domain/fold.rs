// ============================================================
// Layer 3 — Fold Domain Type
// ============================================================
// A fold is one train/validation split in k-fold
// cross-validation, expressed as two disjoint index sets over
// the same dataset.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    /// Zero-based position of this fold in the k-fold sequence
    pub index: usize,

    /// Dataset indices used to fit the model
    pub train_indices: Vec<usize>,

    /// Dataset indices held out for validation
    pub val_indices: Vec<usize>,
}

impl Fold {
    pub fn new(index: usize, train_indices: Vec<usize>, val_indices: Vec<usize>) -> Self {
        Self { index, train_indices, val_indices }
    }

    /// 1-based fold number used in logs, file names and metric tags.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    /// True when no index is used for both training and validation.
    pub fn is_disjoint(&self) -> bool {
        let mut train = self.train_indices.clone();
        train.sort_unstable();
        self.val_indices
            .iter()
            .all(|i| train.binary_search(i).is_err())
    }
}
