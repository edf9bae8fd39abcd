// ============================================================
// Layer 1 — CLI Arguments
// ============================================================
// Every option shared by the three modes (--train, --visualize,
// --confusion-matrix) lives on one flat argument struct, so a
// single invocation can train and then evaluate with the same
// checkpoint and model shape.
//
// Conversion into the application configs happens here; the
// application layer never sees clap types.

use clap::{Args, ValueEnum};
use std::path::PathBuf;

use crate::application::config::{
    DeviceKind, EvalConfig, ModelShape, TrainConfig, VisualizeConfig,
};
use crate::domain::metrics::SelectionMetric;
use crate::infra::checkpoint::CheckpointPolicy;

/// Tensor backend to run on
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceArg {
    Cpu,
    Wgpu,
}

impl From<DeviceArg> for DeviceKind {
    fn from(d: DeviceArg) -> Self {
        match d {
            DeviceArg::Cpu  => DeviceKind::Cpu,
            DeviceArg::Wgpu => DeviceKind::Wgpu,
        }
    }
}

/// What happens to the checkpoint after each fold
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    /// Rewrite the same file after every fold
    Overwrite,
    /// Keep one file per fold (<checkpoint>_fold<N>)
    KeepAll,
    /// Keep the fold with the highest final validation accuracy
    BestAccuracy,
    /// Keep the fold with the lowest final validation loss
    BestLoss,
}

impl From<PolicyArg> for CheckpointPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Overwrite    => CheckpointPolicy::Overwrite,
            PolicyArg::KeepAll      => CheckpointPolicy::KeepAll,
            PolicyArg::BestAccuracy => CheckpointPolicy::KeepBest(SelectionMetric::ValAccuracy),
            PolicyArg::BestLoss     => CheckpointPolicy::KeepBest(SelectionMetric::ValLoss),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    // ── Data ─────────────────────────────────────────────────────────────────
    /// Training images, one sub-folder per class
    #[arg(long, default_value = "data/train")]
    pub train_dir: PathBuf,

    /// Held-out images for --confusion-matrix, same folder layout
    #[arg(long, default_value = "data/test")]
    pub test_dir: PathBuf,

    /// Images to explain with --visualize (comma separated or repeated)
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub images: Vec<PathBuf>,

    /// Expected number of classes; defaults to the number of class folders
    #[arg(long)]
    pub num_classes: Option<usize>,

    // ── Outputs ──────────────────────────────────────────────────────────────
    /// Where metric CSVs and rendered PNGs are written
    #[arg(long, default_value = "runs")]
    pub output_dir: PathBuf,

    /// Checkpoint path, without the .mpk.gz extension
    #[arg(long, default_value = "checkpoints/vit")]
    pub checkpoint: PathBuf,

    #[arg(long, value_enum, default_value_t = PolicyArg::Overwrite)]
    pub checkpoint_policy: PolicyArg,

    // ── Optimisation ─────────────────────────────────────────────────────────
    /// Epochs per fold
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Initial learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Final learning rate as a fraction of --lr (cosine schedule)
    #[arg(long, default_value_t = 0.01)]
    pub lrf: f64,

    #[arg(long, default_value_t = 5e-5)]
    pub weight_decay: f64,

    #[arg(long, default_value_t = 5)]
    pub k_folds: usize,

    /// Seed for fold assignment, shuffling and weight init
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    // ── Runtime ──────────────────────────────────────────────────────────────
    #[arg(long, value_enum, default_value_t = DeviceArg::Cpu)]
    pub device: DeviceArg,

    /// Data loader worker threads
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    // ── Model shape ──────────────────────────────────────────────────────────
    /// Square input resolution in pixels
    #[arg(long, default_value_t = 224)]
    pub image_size: usize,

    /// Patch side; must divide --image-size
    #[arg(long, default_value_t = 16)]
    pub patch_size: usize,

    /// Token embedding width; must be divisible by --num-heads
    #[arg(long, default_value_t = 192)]
    pub d_model: usize,

    #[arg(long, default_value_t = 3)]
    pub num_heads: usize,

    /// Encoder blocks
    #[arg(long, default_value_t = 6)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 768)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    // ── Grad-CAM ─────────────────────────────────────────────────────────────
    /// Encoder block to explain (0-based); defaults to the last one
    #[arg(long)]
    pub target_block: Option<usize>,

    /// Heat map opacity when blended over the image
    #[arg(long, default_value_t = 0.5)]
    pub alpha: f32,
}

impl RunArgs {
    fn model_shape(&self) -> ModelShape {
        ModelShape {
            image_size: self.image_size,
            patch_size: self.patch_size,
            d_model:    self.d_model,
            num_heads:  self.num_heads,
            num_layers: self.num_layers,
            d_ff:       self.d_ff,
            dropout:    self.dropout,
        }
    }
}

impl From<&RunArgs> for TrainConfig {
    fn from(a: &RunArgs) -> Self {
        TrainConfig {
            train_dir:         a.train_dir.clone(),
            output_dir:        a.output_dir.clone(),
            checkpoint:        a.checkpoint.clone(),
            checkpoint_policy: a.checkpoint_policy.into(),
            num_classes:       a.num_classes,
            epochs:            a.epochs,
            batch_size:        a.batch_size,
            lr:                a.lr,
            lrf:               a.lrf,
            weight_decay:      a.weight_decay,
            k_folds:           a.k_folds,
            seed:              a.seed,
            num_workers:       a.num_workers,
            device:            a.device.into(),
            model:             a.model_shape(),
        }
    }
}

impl From<&RunArgs> for EvalConfig {
    fn from(a: &RunArgs) -> Self {
        EvalConfig {
            test_dir:    a.test_dir.clone(),
            output_dir:  a.output_dir.clone(),
            checkpoint:  a.checkpoint.clone(),
            num_classes: a.num_classes,
            batch_size:  a.batch_size,
            num_workers: a.num_workers,
            device:      a.device.into(),
            model:       a.model_shape(),
        }
    }
}

impl From<&RunArgs> for VisualizeConfig {
    fn from(a: &RunArgs) -> Self {
        VisualizeConfig {
            images:       a.images.clone(),
            output_dir:   a.output_dir.clone(),
            checkpoint:   a.checkpoint.clone(),
            num_classes:  a.num_classes,
            target_block: a.target_block,
            alpha:        a.alpha,
            device:       a.device.into(),
            model:        a.model_shape(),
        }
    }
}
