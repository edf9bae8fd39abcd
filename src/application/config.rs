// ============================================================
// Layer 2 — Run Configuration
// ============================================================
// Plain serde structs built from the CLI arguments. The
// application layer never sees clap types; the CLI converts
// its args with `From` impls (see cli/commands.rs).
//
// Side files written next to the checkpoint:
//   train_config.json   — the TrainConfig of the run
//   class_indices.json  — label index → class folder name
//
// Evaluation and visualisation read train_config.json back so
// they rebuild exactly the architecture that was trained. The
// shape passed on their own command line is only a fallback.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::infra::checkpoint::{CheckpointManager, CheckpointPolicy};
use crate::ml::model::VitConfig;

pub const TRAIN_CONFIG_FILE:  &str = "train_config.json";
pub const CLASS_INDICES_FILE: &str = "class_indices.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// NdArray backend
    #[default]
    Cpu,
    /// Wgpu backend, default adapter
    Wgpu,
}

/// Architecture hyperparameters, everything but the class count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelShape {
    pub image_size: usize,
    pub patch_size: usize,
    pub d_model:    usize,
    pub num_heads:  usize,
    pub num_layers: usize,
    pub d_ff:       usize,
    pub dropout:    f64,
}

impl Default for ModelShape {
    fn default() -> Self {
        Self {
            image_size: 224,
            patch_size: 16,
            d_model:    192,
            num_heads:  3,
            num_layers: 6,
            d_ff:       768,
            dropout:    0.1,
        }
    }
}

impl ModelShape {
    pub fn vit_config(&self, num_classes: usize) -> VitConfig {
        VitConfig::new(num_classes)
            .with_image_size(self.image_size)
            .with_patch_size(self.patch_size)
            .with_d_model(self.d_model)
            .with_num_heads(self.num_heads)
            .with_num_layers(self.num_layers)
            .with_d_ff(self.d_ff)
            .with_dropout(self.dropout)
    }
}

// ─── Training ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub train_dir:         PathBuf,
    pub output_dir:        PathBuf,
    pub checkpoint:        PathBuf,
    pub checkpoint_policy: CheckpointPolicy,
    /// Expected class count; `None` takes it from the folder
    pub num_classes:       Option<usize>,
    pub epochs:            usize,
    pub batch_size:        usize,
    pub lr:                f64,
    /// Final learning rate as a fraction of `lr`
    pub lrf:               f64,
    pub weight_decay:      f64,
    pub k_folds:           usize,
    pub seed:              u64,
    pub num_workers:       usize,
    pub device:            DeviceKind,
    pub model:             ModelShape,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_dir:         PathBuf::from("data/train"),
            output_dir:        PathBuf::from("runs"),
            checkpoint:        PathBuf::from("checkpoints/vit"),
            checkpoint_policy: CheckpointPolicy::Overwrite,
            num_classes:       None,
            epochs:            10,
            batch_size:        8,
            lr:                1e-3,
            lrf:               0.01,
            weight_decay:      5e-5,
            k_folds:           5,
            seed:              42,
            num_workers:       4,
            device:            DeviceKind::Cpu,
            model:             ModelShape::default(),
        }
    }
}

// ─── Evaluation ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    pub test_dir:    PathBuf,
    pub output_dir:  PathBuf,
    pub checkpoint:  PathBuf,
    pub num_classes: Option<usize>,
    pub batch_size:  usize,
    pub num_workers: usize,
    pub device:      DeviceKind,
    pub model:       ModelShape,
}

// ─── Visualisation ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizeConfig {
    pub images:       Vec<PathBuf>,
    pub output_dir:   PathBuf,
    pub checkpoint:   PathBuf,
    pub num_classes:  Option<usize>,
    /// Encoder block whose input is explained; `None` = last
    pub target_block: Option<usize>,
    /// Weight of the heat map when blended over the image
    pub alpha:        f32,
    pub device:       DeviceKind,
    pub model:        ModelShape,
}

// ─── Side files ───────────────────────────────────────────────────────────────
/// `<checkpoint dir>/<name>`
pub fn side_file(checkpoint: &Path, name: &str) -> PathBuf {
    match checkpoint.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
        _ => PathBuf::from(name),
    }
}

/// The architecture a checkpoint was trained with.
///
/// Prefers the saved train_config.json; falls back to `shape` and
/// `num_classes` from the caller when the run left no side file.
pub fn trained_vit_config(
    checkpoint:  &Path,
    shape:       &ModelShape,
    num_classes: Option<usize>,
    classes_on_disk: usize,
) -> Result<VitConfig> {
    let path = side_file(checkpoint, TRAIN_CONFIG_FILE);
    let cfg = if path.exists() {
        let saved: TrainConfig = CheckpointManager::new().load_json(&path)?;
        let n = saved.num_classes.or(num_classes).unwrap_or(classes_on_disk);
        tracing::info!("Using model shape from '{}'", path.display());
        saved.model.vit_config(n)
    } else {
        tracing::warn!(
            "No '{}' next to the checkpoint; using the command-line model shape",
            TRAIN_CONFIG_FILE
        );
        shape.vit_config(num_classes.unwrap_or(classes_on_disk))
    };
    cfg.validate()?;
    Ok(cfg)
}

/// 8×8 images, one block. Small enough for end-to-end CPU tests.
#[cfg(test)]
pub(crate) fn tiny_shape() -> ModelShape {
    ModelShape {
        image_size: 8,
        patch_size: 4,
        d_model:    8,
        num_heads:  2,
        num_layers: 1,
        d_ff:       16,
        dropout:    0.0,
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_file_location() {
        assert_eq!(side_file(Path::new("ckpt/vit"), "a.json"), PathBuf::from("ckpt/a.json"));
        assert_eq!(side_file(Path::new("vit"), "a.json"), PathBuf::from("a.json"));
    }

    #[test]
    fn test_saved_config_wins_over_fallback() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = tmp.path().join("vit");

        let mut saved = TrainConfig::default();
        saved.num_classes = Some(4);
        saved.model.image_size = 32;
        saved.model.patch_size = 8;
        CheckpointManager::new()
            .save_json(&saved, &side_file(&ckpt, TRAIN_CONFIG_FILE))
            .unwrap();

        let cfg = trained_vit_config(&ckpt, &ModelShape::default(), Some(2), 9).unwrap();
        assert_eq!(cfg.num_classes, 4);
        assert_eq!(cfg.image_size, 32);
    }

    #[test]
    fn test_fallback_without_side_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = trained_vit_config(&tmp.path().join("vit"), &ModelShape::default(), None, 3).unwrap();
        assert_eq!(cfg.num_classes, 3);
        assert_eq!(cfg.patch_size, 16);
    }

    #[test]
    fn test_train_config_json_round_trip() {
        let json = serde_json::to_string(&TrainConfig::default()).unwrap();
        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.k_folds, 5);
        assert_eq!(back.checkpoint_policy, CheckpointPolicy::Overwrite);
        assert_eq!(back.model, ModelShape::default());
    }
}
