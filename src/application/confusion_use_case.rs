// ============================================================
// Layer 2 — ConfusionMatrixUseCase
// ============================================================
// Evaluates a saved checkpoint on a held-out image folder:
//
//   Step 1: Rebuild the trained architecture  (train_config.json)
//   Step 2: Map test folders onto the training class indices
//   Step 3: Load the checkpoint + run every test batch
//   Step 4: Summarise and render the matrix   (confusion_matrix.png)
//
// Test class folders are matched to training classes by name,
// so a test set may hold a subset of the classes.

use anyhow::{bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    prelude::Backend,
};
use std::path::PathBuf;

use crate::application::config::{
    side_file, trained_vit_config, DeviceKind, EvalConfig, CLASS_INDICES_FILE,
};
use crate::data::{
    dataset::ImageDataset,
    loader::{ClassIndex, ImageFolder, LabelledImages},
    transform::ImageTransform,
};
use crate::domain::{
    confusion::{ConfusionMatrix, ConfusionSummary},
    error::CoreError,
    sample::Sample,
};
use crate::infra::render::save_png;
use crate::ml::evaluation::EvaluationRunner;

/// What an evaluation run produced.
#[derive(Debug, Clone)]
pub struct ConfusionOutcome {
    pub matrix:  ConfusionMatrix,
    pub summary: ConfusionSummary,
    pub image:   PathBuf,
}

pub struct ConfusionMatrixUseCase {
    config: EvalConfig,
}

impl ConfusionMatrixUseCase {
    pub fn new(config: EvalConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<ConfusionOutcome> {
        match self.config.device {
            DeviceKind::Cpu  => self.execute_on::<NdArray>(NdArrayDevice::Cpu),
            DeviceKind::Wgpu => self.execute_on::<Wgpu>(WgpuDevice::default()),
        }
    }

    fn execute_on<B: Backend>(&self, device: B::Device) -> Result<ConfusionOutcome> {
        let cfg   = &self.config;
        let found = ImageFolder::new(&cfg.test_dir).load()?;
        if found.samples.is_empty() {
            return Err(CoreError::EmptyDataset(cfg.test_dir.display().to_string()).into());
        }

        // ── Step 1 + 2: architecture and class names ─────────────────────────
        let index_path = side_file(&cfg.checkpoint, CLASS_INDICES_FILE);
        let class_names = if index_path.exists() {
            ClassIndex::load(&index_path)?.names()
        } else {
            tracing::warn!("No '{}' found; using the test folder's class order", CLASS_INDICES_FILE);
            found.class_names.clone()
        };
        let vit_cfg = trained_vit_config(&cfg.checkpoint, &cfg.model, cfg.num_classes, class_names.len())?;
        let samples = align_labels(found, &class_names)?;
        let labels: Vec<String> = (0..vit_cfg.num_classes)
            .map(|i| class_names.get(i).cloned().unwrap_or_else(|| i.to_string()))
            .collect();

        // ── Step 3: Load the checkpoint + evaluate ───────────────────────────
        let runner = EvaluationRunner::<B>::from_checkpoint(&vit_cfg, &cfg.checkpoint, cfg.batch_size, device)?
            .with_num_workers(cfg.num_workers);
        let dataset = ImageDataset::new(samples, ImageTransform::eval(vit_cfg.image_size as u32));
        let matrix  = runner.run(dataset, labels)?;

        // ── Step 4: Summarise + render ────────────────────────────────────────
        let summary = matrix.summary();
        let image   = cfg.output_dir.join("confusion_matrix.png");
        save_png(&matrix.render(), &image)?;

        Ok(ConfusionOutcome { matrix, summary, image })
    }
}

/// Relabel test samples so each folder name maps to its training index.
fn align_labels(found: LabelledImages, class_names: &[String]) -> Result<Vec<Sample>> {
    let mut mapping = Vec::with_capacity(found.class_names.len());
    for name in &found.class_names {
        match class_names.iter().position(|c| c == name) {
            Some(i) => mapping.push(i),
            None => bail!("test class '{}' was not part of training ({:?})", name, class_names),
        }
    }
    Ok(found
        .samples
        .into_iter()
        .map(|s| {
            let label = mapping[s.label()];
            Sample::new(s.path().to_path_buf(), label)
        })
        .collect())
}
