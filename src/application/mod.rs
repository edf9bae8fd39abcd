// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one goal per use case:
// training, Grad-CAM visualisation, or confusion-matrix
// evaluation.
//
// Rules for this layer:
//   - No tensor math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination

/// Run configuration shared with the CLI
pub mod config;

/// Fold loop, checkpoint policy and global metric step
pub mod cross_validation;

/// The k-fold training workflow
pub mod train_use_case;

/// Grad-CAM overlays for single images
pub mod visualize_use_case;

/// Held-out evaluation and the rendered confusion matrix
pub mod confusion_use_case;
