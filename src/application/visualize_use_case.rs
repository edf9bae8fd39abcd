// ============================================================
// Layer 2 — VisualizeUseCase
// ============================================================
// Grad-CAM explanations for individual images:
//
//   Step 1: Rebuild the trained architecture, dropout off
//   Step 2: Load the checkpoint on an autodiff backend
//   Step 3: Per image: transform → GradCam → jet overlay
//   Step 4: Save <output_dir>/<image stem>_gradcam.png
//
// The predicted class is named from class_indices.json when the
// training run left one behind.

use anyhow::{bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::path::PathBuf;

use crate::application::config::{
    side_file, trained_vit_config, DeviceKind, VisualizeConfig, CLASS_INDICES_FILE,
};
use crate::data::{
    loader::ClassIndex,
    transform::{load_resized, ImageTransform},
};
use crate::infra::{
    checkpoint::CheckpointManager,
    render::{overlay_heatmap, save_png},
};
use crate::ml::{gradcam::GradCam, model::VitClassifier};

/// One explained image.
#[derive(Debug, Clone)]
pub struct Explanation {
    pub image:       PathBuf,
    pub output:      PathBuf,
    pub class:       usize,
    pub class_name:  String,
    pub probability: f32,
}

pub struct VisualizeUseCase {
    config: VisualizeConfig,
}

impl VisualizeUseCase {
    pub fn new(config: VisualizeConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<Vec<Explanation>> {
        match self.config.device {
            DeviceKind::Cpu  => self.execute_on::<Autodiff<NdArray>>(NdArrayDevice::Cpu),
            DeviceKind::Wgpu => self.execute_on::<Autodiff<Wgpu>>(WgpuDevice::default()),
        }
    }

    fn execute_on<B: AutodiffBackend>(&self, device: B::Device) -> Result<Vec<Explanation>> {
        let cfg = &self.config;
        if cfg.images.is_empty() {
            bail!("no images given to visualise (use --images)");
        }

        // ── Step 1: architecture + class names ───────────────────────────────
        let index_path  = side_file(&cfg.checkpoint, CLASS_INDICES_FILE);
        let class_names = if index_path.exists() {
            ClassIndex::load(&index_path)?.names()
        } else {
            Vec::new()
        };
        let fallback_classes = cfg.num_classes.unwrap_or(class_names.len()).max(1);
        let vit_cfg = trained_vit_config(&cfg.checkpoint, &cfg.model, cfg.num_classes, fallback_classes)?
            .with_dropout(0.0);

        // ── Step 2: load the model ────────────────────────────────────────────
        let model: VitClassifier<B> = CheckpointManager::new().load(&vit_cfg, &cfg.checkpoint, &device)?;
        let cam = GradCam::new(&model, cfg.target_block)?;
        tracing::info!("Explaining encoder block {} of {}", cam.target_block(), model.num_layers());

        // ── Step 3 + 4: one overlay per image ─────────────────────────────────
        let size      = vit_cfg.image_size as u32;
        let transform = ImageTransform::eval(size);
        let mut explanations = Vec::with_capacity(cfg.images.len());

        for path in &cfg.images {
            let pixels = transform.load(path)?;
            let images = Tensor::<B, 4>::from_data(
                TensorData::new(pixels, [1, 3, vit_cfg.image_size, vit_cfg.image_size]),
                &device,
            );
            let map = cam
                .compute(images, None)?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("no saliency map for '{}'", path.display()))?;

            let base    = load_resized(path, size)?;
            let overlay = overlay_heatmap(&base, &map.values, map.grid as u32, cfg.alpha)?;

            let stem   = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            let output = cfg.output_dir.join(format!("{stem}_gradcam.png"));
            save_png(&overlay, &output)?;

            let class_name = class_names.get(map.class).cloned().unwrap_or_else(|| map.class.to_string());
            tracing::info!(
                "'{}' → {} ({:.1}%)",
                path.display(),
                class_name,
                map.probability * 100.0
            );
            explanations.push(Explanation {
                image: path.clone(),
                output,
                class: map.class,
                class_name,
                probability: map.probability,
            });
        }

        Ok(explanations)
    }
}
