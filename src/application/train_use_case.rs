// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Runs the full k-fold training pipeline in order:
//
//   Step 1: Discover labelled images        (Layer 4 - data)
//   Step 2: Resolve the model architecture  (Layer 5 - ml)
//   Step 3: Save class index + run config   (Layer 6 - infra)
//   Step 4: Build the epoch workbench       (Layer 5 - ml)
//   Step 5: Cross-validate all folds        (Layer 2 - orchestrator)
//   Step 6: Write the fold history CSV      (Layer 6 - infra)
//
// Backend choice happens once, at the top: every later step is
// generic over the Burn backend.

use anyhow::{bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    tensor::backend::AutodiffBackend,
};

use crate::application::config::{
    side_file, DeviceKind, TrainConfig, CLASS_INDICES_FILE, TRAIN_CONFIG_FILE,
};
use crate::application::cross_validation::{CrossValidationOrchestrator, CrossValidationReport};
use crate::data::{
    dataset::ImageDataset,
    loader::{ClassIndex, ImageFolder},
    splitter::FoldPartitioner,
    transform::ImageTransform,
};
use crate::domain::{error::CoreError, sample::labels_of};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{CsvScalarSink, FoldHistoryLog},
};
use crate::ml::{
    fold_trainer::FoldTrainer,
    schedule::CosineSchedule,
    trainer::{StepConfig, VitWorkbench},
};

pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<CrossValidationReport> {
        match self.config.device {
            DeviceKind::Cpu  => self.execute_on::<Autodiff<NdArray>>(NdArrayDevice::Cpu),
            DeviceKind::Wgpu => self.execute_on::<Autodiff<Wgpu>>(WgpuDevice::default()),
        }
    }

    fn execute_on<B: AutodiffBackend>(&self, device: B::Device) -> Result<CrossValidationReport> {
        let cfg = &self.config;
        B::seed(cfg.seed);

        // ── Step 1: Discover labelled images ──────────────────────────────────
        let found = ImageFolder::new(&cfg.train_dir).load()?;
        if found.samples.is_empty() {
            return Err(CoreError::EmptyDataset(cfg.train_dir.display().to_string()).into());
        }
        tracing::info!("Samples per class: {:?}", found.class_counts());

        // ── Step 2: Resolve the model architecture ────────────────────────────
        let num_classes = match cfg.num_classes {
            Some(n) if n != found.num_classes() => bail!(
                "--num-classes is {} but '{}' has {} class folders",
                n,
                cfg.train_dir.display(),
                found.num_classes()
            ),
            _ => found.num_classes(),
        };
        let vit_cfg = cfg.model.vit_config(num_classes);
        vit_cfg.validate()?;

        // ── Step 3: Save class index + run config ─────────────────────────────
        let store = CheckpointManager::new();
        let mut saved = cfg.clone();
        saved.num_classes = Some(num_classes);
        store.save_json(&saved, &side_file(&cfg.checkpoint, TRAIN_CONFIG_FILE))?;
        ClassIndex::from_names(&found.class_names)
            .save(&side_file(&cfg.checkpoint, CLASS_INDICES_FILE))?;

        // ── Step 4: Build the epoch workbench ─────────────────────────────────
        let labels  = labels_of(&found.samples);
        let dataset = ImageDataset::new(found.samples, ImageTransform::eval(cfg.model.image_size as u32));
        let steps   = StepConfig {
            batch_size:   cfg.batch_size.max(1),
            num_workers:  cfg.num_workers.max(1),
            seed:         cfg.seed,
            schedule:     CosineSchedule::new(cfg.lr, cfg.lrf, cfg.epochs),
            weight_decay: cfg.weight_decay,
        };
        let workbench = VitWorkbench::<B>::new(dataset, vit_cfg, steps, device);

        // ── Step 5: Cross-validate all folds ──────────────────────────────────
        let mut sink = CsvScalarSink::new(&cfg.output_dir)?;
        let mut orchestrator = CrossValidationOrchestrator::new(
            FoldPartitioner::new(cfg.k_folds, cfg.seed),
            FoldTrainer::new(cfg.epochs, num_classes),
            cfg.checkpoint_policy,
            cfg.checkpoint.clone(),
        );
        tracing::info!(
            "Training {} folds × {} epochs on {:?} (checkpoint policy: {:?})",
            cfg.k_folds,
            cfg.epochs,
            cfg.device,
            cfg.checkpoint_policy
        );
        let report = orchestrator.run(&labels, &workbench, &workbench, &workbench, &store, &mut sink)?;

        // ── Step 6: Write the fold history CSV ────────────────────────────────
        FoldHistoryLog::write(&report.histories, &cfg.output_dir.join("cv_metrics.csv"))?;

        Ok(report)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::tiny_shape;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    fn write_folder(root: &Path) {
        for (class, shade) in [("bright", 220u8), ("dark", 30)] {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..4 {
                RgbImage::from_pixel(8, 8, Rgb([shade, shade, shade - i]))
                    .save(dir.join(format!("{i}.png")))
                    .unwrap();
            }
        }
    }

    fn config(root: &Path) -> TrainConfig {
        TrainConfig {
            train_dir:   root.join("train"),
            output_dir:  root.join("runs"),
            checkpoint:  root.join("ckpt/vit"),
            epochs:      1,
            batch_size:  4,
            k_folds:     2,
            num_workers: 1,
            model:       tiny_shape(),
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_end_to_end_on_cpu() {
        let tmp = tempfile::tempdir().unwrap();
        write_folder(&tmp.path().join("train"));

        let report = TrainUseCase::new(config(tmp.path())).execute().unwrap();
        assert_eq!(report.histories.len(), 2);
        assert_eq!(report.checkpoints.len(), 2);

        assert!(tmp.path().join("ckpt/vit.mpk.gz").exists());
        assert!(tmp.path().join("ckpt/train_config.json").exists());
        assert!(tmp.path().join("runs/scalars.csv").exists());

        let names = ClassIndex::load(&tmp.path().join("ckpt/class_indices.json")).unwrap().names();
        assert_eq!(names, vec!["bright", "dark"]);

        let csv = std::fs::read_to_string(tmp.path().join("runs/cv_metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_keep_all_run_can_be_evaluated() {
        use crate::application::config::EvalConfig;
        use crate::application::confusion_use_case::ConfusionMatrixUseCase;
        use crate::infra::checkpoint::CheckpointPolicy;

        let tmp = tempfile::tempdir().unwrap();
        write_folder(&tmp.path().join("train"));

        let mut cfg = config(tmp.path());
        cfg.checkpoint_policy = CheckpointPolicy::KeepAll;
        let report = TrainUseCase::new(cfg.clone()).execute().unwrap();
        assert!(tmp.path().join("ckpt/vit_fold1.mpk.gz").exists());
        assert!(tmp.path().join("ckpt/vit_fold2.mpk.gz").exists());
        assert_eq!(report.checkpoints.last(), Some(&cfg.checkpoint));

        let outcome = ConfusionMatrixUseCase::new(EvalConfig {
            test_dir:    cfg.train_dir.clone(),
            output_dir:  cfg.output_dir.clone(),
            checkpoint:  cfg.checkpoint.clone(),
            num_classes: None,
            batch_size:  4,
            num_workers: 1,
            device:      DeviceKind::Cpu,
            model:       tiny_shape(),
        })
        .execute()
        .unwrap();
        assert_eq!(outcome.matrix.total(), 8);
    }

    #[test]
    fn test_class_count_mismatch_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_folder(&tmp.path().join("train"));

        let mut cfg = config(tmp.path());
        cfg.num_classes = Some(5);
        assert!(TrainUseCase::new(cfg).execute().is_err());
    }

    #[test]
    fn test_empty_folder_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("train")).unwrap();

        let err = TrainUseCase::new(config(tmp.path())).execute().unwrap_err();
        assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::EmptyDataset(_))));
    }
}
