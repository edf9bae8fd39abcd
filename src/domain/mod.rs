// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing the core
// concepts: samples, folds, metrics, the confusion matrix,
// errors, and the contracts of external collaborators.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only plain data and pure computation

/// A labelled image reference
pub mod sample;

/// Train/validation index split
pub mod fold;

/// Per-epoch and cross-fold training metrics
pub mod metrics;

/// Prediction/label count matrix and derived metrics
pub mod confusion;

/// Typed error taxonomy
pub mod error;

/// Collaborator contracts the core is written against
pub mod traits;
