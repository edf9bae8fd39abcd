// ============================================================
// Layer 3 — Sample Domain Type
// ============================================================
// One labelled image on disk. The pixels are not held here:
// decoding happens lazily in the data layer, so a sample is
// just a path and a class index and is cheap to clone.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An (input reference, class label) pair. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Location of the encoded image
    path: PathBuf,

    /// Class index in `[0, num_classes)`
    label: usize,
}

impl Sample {
    pub fn new(path: impl Into<PathBuf>, label: usize) -> Self {
        Self { path: path.into(), label }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn label(&self) -> usize {
        self.label
    }
}

/// Extract the label column of a sample list, in order.
pub fn labels_of(samples: &[Sample]) -> Vec<usize> {
    samples.iter().map(Sample::label).collect()
}
