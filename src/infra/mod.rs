// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that don't belong to a business layer:
//
//   checkpoint.rs — model weights via Burn's NamedMpkGzFileRecorder,
//                   fold checkpoint policies, JSON side files
//
//   metrics.rs    — scalar sinks (CSV on disk, in-memory for
//                   tests) and the per-fold history CSV
//
//   render.rs     — PNG rendering: the confusion matrix grid and
//                   Grad-CAM heat map overlays

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logging
pub mod metrics;

/// Image rendering for evaluation and visualisation output
pub mod render;
