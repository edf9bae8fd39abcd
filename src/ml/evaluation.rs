// ============================================================
// Layer 5 — Evaluation Runner
// ============================================================
// Loads a trained model from a checkpoint and runs it over a
// held-out image set, feeding every batch's predictions into a
// ConfusionMatrix:
//
//   checkpoint → VitClassifier (shape-checked)
//   test set   → fixed-size batches, never shuffled
//   per batch  → softmax → arg-max → ConfusionMatrix::update
//
// The matrix is owned here and updated from this thread only,
// batch by batch in loader order.

use anyhow::{Context, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    prelude::*,
    tensor::activation::softmax,
};
use std::path::Path;

use crate::data::{
    batcher::ImageBatcher,
    dataset::{ensure_complete, ImageDataset},
};
use crate::domain::confusion::ConfusionMatrix;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::{VitClassifier, VitConfig};

pub struct EvaluationRunner<B: Backend> {
    model:       VitClassifier<B>,
    image_size:  usize,
    batch_size:  usize,
    num_workers: usize,
    device:      B::Device,
}

impl<B: Backend> EvaluationRunner<B> {
    pub fn new(model: VitClassifier<B>, cfg: &VitConfig, batch_size: usize, device: B::Device) -> Self {
        Self {
            model,
            image_size: cfg.image_size,
            batch_size: batch_size.max(1),
            num_workers: 1,
            device,
        }
    }

    /// Build a fresh model from `cfg` and load the weights at `path`.
    pub fn from_checkpoint(
        cfg:        &VitConfig,
        path:       &Path,
        batch_size: usize,
        device:     B::Device,
    ) -> Result<Self> {
        let model = CheckpointManager::new().load::<B>(cfg, path, &device)?;
        Ok(Self::new(model, cfg, batch_size, device))
    }

    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    pub fn model(&self) -> &VitClassifier<B> {
        &self.model
    }

    /// Highest-probability class for each image in the batch.
    pub fn predict(&self, images: Tensor<B, 4>) -> Result<Vec<usize>> {
        let probs = softmax(self.model.forward(images), 1);
        let top   = probs.argmax(1).flatten::<1>(0, 1);
        let ids: Vec<i64> = top
            .into_data()
            .convert::<i64>()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("Cannot read predictions: {e:?}"))?;
        Ok(ids.into_iter().map(|i| i.max(0) as usize).collect())
    }

    /// Run the whole dataset and return the populated matrix.
    pub fn run(&self, dataset: ImageDataset, labels: Vec<String>) -> Result<ConfusionMatrix> {
        let total   = dataset.samples().len();
        let batcher = ImageBatcher::<B>::new(self.device.clone(), self.image_size);
        let loader  = DataLoaderBuilder::new(batcher)
            .batch_size(self.batch_size)
            .num_workers(self.num_workers)
            .build(dataset);

        let mut matrix = ConfusionMatrix::new(labels);
        let mut seen   = 0usize;

        for (i, batch) in loader.iter().enumerate() {
            let truths: Vec<i64> = batch
                .targets
                .into_data()
                .convert::<i64>()
                .to_vec()
                .map_err(|e| anyhow::anyhow!("Cannot read targets: {e:?}"))?;
            let truths: Vec<usize> = truths.into_iter().map(|t| t.max(0) as usize).collect();
            let predictions = self.predict(batch.images)?;

            matrix
                .update(&predictions, &truths)
                .with_context(|| format!("Evaluation batch {i} failed"))?;
            seen += truths.len();
            tracing::debug!("Evaluated batch {} ({} / {} images)", i, seen, total);
        }

        ensure_complete("evaluation", seen, total)?;
        tracing::info!("Evaluated {} images", seen);
        Ok(matrix)
    }
}
