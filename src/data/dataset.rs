use burn::data::dataset::Dataset;
use std::sync::Arc;

use crate::data::transform::ImageTransform;
use crate::domain::{error::CoreError, sample::Sample};

/// One decoded, transformed image ready for batching.
/// Pixels are CHW, normalised, length 3 * size * size.
#[derive(Debug, Clone)]
pub struct ImageItem {
    pub pixels: Vec<f32>,
    pub label:  usize,
}

/// Ordered labelled images, decoded on demand.
pub struct ImageDataset {
    samples:   Vec<Sample>,
    transform: ImageTransform,
}

impl ImageDataset {
    pub fn new(samples: Vec<Sample>, transform: ImageTransform) -> Self {
        Self { samples, transform }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Same samples, different transform (e.g. train vs. validation).
    pub fn with_transform(&self, transform: ImageTransform) -> Self {
        Self { samples: self.samples.clone(), transform }
    }
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let sample = self.samples.get(index)?;
        match self.transform.load(sample.path()) {
            Ok(pixels) => Some(ImageItem { pixels, label: sample.label() }),
            Err(e) => {
                tracing::warn!("Skipping sample {}: {:#}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Burn's loaders end a pass at the first `None` from `get`, so a
/// short count after iterating means a sample failed to decode.
pub fn ensure_complete(pass: &str, seen: usize, expected: usize) -> Result<(), CoreError> {
    if seen == expected {
        Ok(())
    } else {
        Err(CoreError::IncompletePass { pass: pass.to_string(), seen, expected })
    }
}

/// A view over a shared dataset restricted to some indices.
/// The underlying samples are never copied.
pub struct IndexedSubset<D> {
    source:  Arc<D>,
    indices: Vec<usize>,
}

impl<D> IndexedSubset<D> {
    pub fn new(source: Arc<D>, indices: Vec<usize>) -> Self {
        Self { source, indices }
    }
}

impl<D, I> Dataset<I> for IndexedSubset<D>
where
    D: Dataset<I>,
    I: Send + Sync,
{
    fn get(&self, index: usize) -> Option<I> {
        self.indices.get(index).and_then(|&i| self.source.get(i))
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}
