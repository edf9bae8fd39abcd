// ============================================================
// Layer 3 — Core Error Taxonomy
// ============================================================
// Typed failures raised by the core. Use cases wrap these in
// anyhow with extra context; callers that need to react to a
// specific failure use `err.downcast_ref::<CoreError>()`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by partitioning, training, checkpointing and evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// A prediction or ground-truth label outside `[0, num_classes)`.
    #[error("label {label} is outside the class range [0, {num_classes})")]
    InvalidLabel { label: usize, num_classes: usize },

    /// `update` received prediction and truth sequences of different length.
    #[error("got {predictions} predictions but {truths} ground-truth labels")]
    LengthMismatch { predictions: usize, truths: usize },

    /// A class has fewer samples than the requested number of folds.
    #[error("class {class} has {count} samples, fewer than the {folds} folds requested")]
    InsufficientSamples { class: usize, count: usize, folds: usize },

    /// Cross-validation needs at least two folds.
    #[error("k-fold cross-validation needs k >= 2, got {0}")]
    InvalidFoldCount(usize),

    /// Saved weights could not be loaded into the model definition.
    #[error("cannot load checkpoint '{path}': {reason}")]
    CheckpointLoad { path: PathBuf, reason: String },

    /// The training loss stopped being a finite number.
    #[error("training diverged in epoch {epoch}: loss = {loss}")]
    Diverged { epoch: usize, loss: f64 },

    /// A dataset with no samples was handed to a step that needs some.
    #[error("dataset '{0}' contains no samples")]
    EmptyDataset(String),

    /// A data loader pass ended before every sample was visited,
    /// which happens when a sample fails to decode.
    #[error("{pass} stopped after {seen} of {expected} samples; an image could not be decoded")]
    IncompletePass { pass: String, seen: usize, expected: usize },
}
