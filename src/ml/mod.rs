// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Burn-specific training, evaluation and explanation code.
//
//   model.rs        — VitClassifier: patch embedding, class
//                     token, pre-norm encoder blocks, head
//
//   schedule.rs     — per-epoch cosine learning rate and the
//                     Adam handle that applies it
//
//   trainer.rs      — VitWorkbench: builds models/optimizers
//                     and runs one train or validation pass
//
//   fold_trainer.rs — one fold's epoch loop, backend-agnostic
//
//   evaluation.rs   — checkpoint → test set → ConfusionMatrix
//
//   gradcam.rs      — patch-level saliency maps

/// Vision transformer architecture
pub mod model;

/// Learning rate schedule + scheduled optimizer
pub mod schedule;

/// Burn implementation of the epoch steps
pub mod trainer;

/// Per-fold training lifecycle
pub mod fold_trainer;

/// Confusion-matrix evaluation of a checkpoint
pub mod evaluation;

/// Grad-CAM saliency
pub mod gradcam;
