// ============================================================
// Layer 5 — Epoch Steps (Burn implementation)
// ============================================================
// VitWorkbench is the concrete collaborator behind the
// cross-validation core. It owns the training image set and
// knows how to:
//   - build a fresh VitClassifier         (ModelFactory)
//   - build a scheduled Adam optimizer    (OptimizerFactory)
//   - run one training pass over indices  (EpochSteps)
//   - run one validation pass over indices
//
// Burn notes:
//   - Training uses B (Autodiff<...>) for gradients
//   - model.valid() returns the model on B::InnerBackend, so
//     the validation batcher is built for the inner backend
//   - argmax(1) returns [batch, 1]; flatten before .equal()

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

use crate::data::{
    batcher::ImageBatcher,
    dataset::{ensure_complete, ImageDataset, IndexedSubset},
    transform::ImageTransform,
};
use crate::domain::{
    error::CoreError,
    metrics::PassStats,
    traits::{EpochSteps, ModelFactory, OptimizerFactory},
};
use crate::ml::model::{VitClassifier, VitConfig};
use crate::ml::schedule::{CosineSchedule, ScheduledOptimizer};

/// Hyperparameters of the per-epoch passes.
#[derive(Debug, Clone)]
pub struct StepConfig {
    pub batch_size:   usize,
    pub num_workers:  usize,
    pub seed:         u64,
    pub schedule:     CosineSchedule,
    pub weight_decay: f64,
}

pub struct VitWorkbench<B: AutodiffBackend> {
    /// Training view of the samples (random flips on)
    train_set:  Arc<ImageDataset>,
    /// Same samples with the deterministic transform
    eval_set:   Arc<ImageDataset>,
    model_cfg:  VitConfig,
    steps:      StepConfig,
    device:     B::Device,
}

impl<B: AutodiffBackend> VitWorkbench<B> {
    pub fn new(
        dataset:   ImageDataset,
        model_cfg: VitConfig,
        steps:     StepConfig,
        device:    B::Device,
    ) -> Self {
        let image_size = model_cfg.image_size as u32;
        let eval_set   = Arc::new(dataset.with_transform(ImageTransform::eval(image_size)));
        let train_set  = Arc::new(dataset.with_transform(ImageTransform::train(image_size)));
        Self { train_set, eval_set, model_cfg, steps, device }
    }
}

impl<B: AutodiffBackend> ModelFactory for VitWorkbench<B> {
    type Model = VitClassifier<B>;

    fn create(&self, num_classes: usize) -> VitClassifier<B> {
        let mut cfg = self.model_cfg.clone();
        cfg.num_classes = num_classes;
        cfg.init(&self.device)
    }
}

impl<B: AutodiffBackend> OptimizerFactory<VitClassifier<B>> for VitWorkbench<B> {
    type Optimizer = ScheduledOptimizer<VitClassifier<B>, B>;

    fn create(&self, _model: &VitClassifier<B>) -> Self::Optimizer {
        ScheduledOptimizer::adam(self.steps.schedule, self.steps.weight_decay)
    }
}

impl<B: AutodiffBackend> EpochSteps<VitClassifier<B>, ScheduledOptimizer<VitClassifier<B>, B>>
    for VitWorkbench<B>
{
    fn train_one_epoch(
        &self,
        mut model: VitClassifier<B>,
        optimizer: &mut ScheduledOptimizer<VitClassifier<B>, B>,
        indices:   &[usize],
        epoch:     usize,
    ) -> Result<(VitClassifier<B>, PassStats)> {
        if indices.is_empty() {
            return Err(CoreError::EmptyDataset(format!("training subset (epoch {epoch})")).into());
        }

        let batcher = ImageBatcher::<B>::new(self.device.clone(), self.model_cfg.image_size);
        let loader  = DataLoaderBuilder::new(batcher)
            .batch_size(self.steps.batch_size)
            .shuffle(self.steps.seed.wrapping_add(epoch as u64))
            .num_workers(self.steps.num_workers)
            .build(IndexedSubset::new(self.train_set.clone(), indices.to_vec()));

        let ce  = CrossEntropyLossConfig::new().init(&self.device);
        let bar = progress_bar(indices.len(), self.steps.batch_size, format!("train epoch {epoch}"));

        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;
        let mut correct  = 0usize;
        let mut seen     = 0usize;

        for batch in loader.iter() {
            let logits = model.forward(batch.images);
            let loss   = ce.forward(logits.clone(), batch.targets.clone());

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            if !loss_val.is_finite() {
                bar.abandon_with_message("diverged");
                return Err(CoreError::Diverged { epoch, loss: loss_val }.into());
            }

            seen    += batch.targets.dims()[0];
            correct += count_correct(logits.detach(), batch.targets);
            loss_sum += loss_val;
            batches  += 1;

            // Backward pass + Adam update at the scheduled rate
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(model, grads);

            bar.inc(1);
            bar.set_message(format!("loss {:.4}", loss_sum / batches as f64));
        }
        bar.finish_and_clear();
        ensure_complete(&format!("training pass (epoch {epoch})"), seen, indices.len())?;
        optimizer.end_epoch();

        let stats = PassStats::new(mean(loss_sum, batches), fraction(correct, seen));
        tracing::debug!("Epoch {} train: loss={:.4} acc={:.4}", epoch, stats.loss, stats.accuracy);
        Ok((model, stats))
    }

    fn evaluate(&self, model: &VitClassifier<B>, indices: &[usize], epoch: usize) -> Result<PassStats> {
        // dropout disabled, no autodiff graph
        let model_valid = model.valid();

        let batcher = ImageBatcher::<B::InnerBackend>::new(self.device.clone(), self.model_cfg.image_size);
        let loader  = DataLoaderBuilder::new(batcher)
            .batch_size(self.steps.batch_size)
            .num_workers(self.steps.num_workers)
            .build(IndexedSubset::new(self.eval_set.clone(), indices.to_vec()));

        let ce  = CrossEntropyLossConfig::new().init(&self.device);
        let bar = progress_bar(indices.len(), self.steps.batch_size, format!("valid epoch {epoch}"));

        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;
        let mut correct  = 0usize;
        let mut seen     = 0usize;

        for batch in loader.iter() {
            let logits = model_valid.forward(batch.images);
            let loss   = ce.forward(logits.clone(), batch.targets.clone());

            loss_sum += loss.into_scalar().elem::<f64>();
            batches  += 1;
            seen     += batch.targets.dims()[0];
            correct  += count_correct(logits, batch.targets);
            bar.inc(1);
        }
        bar.finish_and_clear();
        ensure_complete(&format!("validation pass (epoch {epoch})"), seen, indices.len())?;

        let stats = PassStats::new(mean(loss_sum, batches), fraction(correct, seen));
        tracing::debug!("Epoch {} valid: loss={:.4} acc={:.4}", epoch, stats.loss, stats.accuracy);
        Ok(stats)
    }
}

/// Number of rows whose arg-max logit equals the target.
fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    let hits: i64 = predicted.equal(targets).int().sum().into_scalar().elem::<i64>();
    hits.max(0) as usize
}

fn mean(sum: f64, n: usize) -> f64 {
    if n > 0 { sum / n as f64 } else { f64::NAN }
}

fn fraction(hits: usize, total: usize) -> f64 {
    if total > 0 { hits as f64 / total as f64 } else { 0.0 }
}

fn progress_bar(items: usize, batch_size: usize, label: String) -> ProgressBar {
    let batches = items.div_ceil(batch_size.max(1)) as u64;
    let bar = ProgressBar::new(batches);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{prefix:>16} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("##-"));
    }
    bar.set_prefix(label);
    bar
}
