// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from an image folder on disk to tensor batches:
//
//   data/<class>/<image>
//       │
//       ▼
//   ImageFolder        → discovers (path, label) samples
//       │
//       ▼
//   FoldPartitioner    → k stratified (train, val) index sets
//       │
//       ▼
//   ImageDataset       → Burn Dataset, decodes + transforms lazily
//   IndexedSubset      → index view for one fold's subset
//       │
//       ▼
//   ImageBatcher       → stacks items into [N, 3, S, S] tensors

/// Discovers labelled images in class folders
pub mod loader;

/// Resize / flip / normalise
pub mod transform;

/// Burn Dataset implementations
pub mod dataset;

/// Burn Batcher implementation
pub mod batcher;

/// Stratified k-fold partitioning
pub mod splitter;
