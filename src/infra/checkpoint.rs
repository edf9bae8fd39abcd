// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores VitClassifier weights with Burn's
// NamedMpkGzFileRecorder at full precision, so a reloaded model
// reproduces the saved one bit for bit.
//
// Writes never leave a half-written checkpoint behind:
//
//   1. record into   <dir>/.<name>-staging.mpk.gz
//   2. rename onto   <dir>/<name>.mpk.gz
//
// `.mpk.gz` is appended to the checkpoint path, never swapped for
// an existing suffix: `out/vit.pth` lives in `out/vit.pth.mpk.gz`.
//
// Loads never return a half-loaded model: the record's shape
// manifest is compared with a freshly built model first, and
// any difference is a CheckpointLoad error.
//
// Which folds get written, and where, is decided by the
// CheckpointPolicy:
//
//   Overwrite          → model.mpk.gz           (last fold wins)
//   KeepAll            → model_fold1.mpk.gz, model_fold2.mpk.gz, ...
//                        plus model.mpk.gz from the last fold
//   KeepBest(metric)   → model.mpk.gz           (only improving folds)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{
    error::CoreError,
    metrics::{FoldHistory, SelectionMetric},
    traits::ModelStore,
};
use crate::ml::model::{VitClassifier, VitClassifierRecord, VitConfig};

const EXTENSION: &str = "mpk.gz";

// ─── CheckpointPolicy ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicy {
    /// One file, rewritten after every fold
    #[default]
    Overwrite,
    /// One file per fold, suffixed `_fold<N>`
    KeepAll,
    /// One file, rewritten only when a fold beats the best so far
    KeepBest(SelectionMetric),
}

impl CheckpointPolicy {
    /// Where fold `fold_number`'s weights go.
    pub fn path_for_fold(&self, base: &Path, fold_number: usize) -> PathBuf {
        match self {
            CheckpointPolicy::KeepAll => {
                let stem = checkpoint_stem(base);
                let name = stem
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "model".to_string());
                stem.with_file_name(format!("{name}_fold{fold_number}"))
            }
            CheckpointPolicy::Overwrite | CheckpointPolicy::KeepBest(_) => base.to_path_buf(),
        }
    }

    /// Every path fold `fold_number` of `folds` is written to.
    ///
    /// KeepAll also writes its last fold to `base`, the path the
    /// evaluation and visualisation modes load from.
    pub fn targets_for_fold(&self, base: &Path, fold_number: usize, folds: usize) -> Vec<PathBuf> {
        let mut targets = vec![self.path_for_fold(base, fold_number)];
        if *self == CheckpointPolicy::KeepAll && fold_number == folds {
            targets.push(base.to_path_buf());
        }
        targets
    }
}

/// Tracks the best fold seen so far for `KeepBest`.
#[derive(Debug, Default)]
pub struct BestFold {
    best: Option<f64>,
}

impl BestFold {
    /// Decide whether this fold's weights should be written under `policy`.
    /// Folds without any epochs are never written by `KeepBest`.
    pub fn should_write(&mut self, policy: CheckpointPolicy, history: &FoldHistory) -> bool {
        let metric = match policy {
            CheckpointPolicy::KeepBest(metric) => metric,
            CheckpointPolicy::Overwrite | CheckpointPolicy::KeepAll => return true,
        };
        let Some(last) = history.last() else {
            return false;
        };
        let value = metric.value(last);
        let improved = match self.best {
            None       => !value.is_nan(),
            Some(best) => metric.is_improvement(value, best),
        };
        if improved {
            self.best = Some(value);
        }
        improved
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }
}

// ─── CheckpointManager ────────────────────────────────────────────────────────
/// Saves and restores model weights plus JSON side files.
#[derive(Debug, Default, Clone)]
pub struct CheckpointManager {
    recorder: NamedMpkGzFileRecorder<FullPrecisionSettings>,
}

impl CheckpointManager {
    pub fn new() -> Self {
        Self { recorder: NamedMpkGzFileRecorder::new() }
    }

    /// The file a checkpoint path resolves to on disk.
    /// `model`, `model.mpk.gz` both map to `model.mpk.gz`.
    pub fn file_path(path: &Path) -> PathBuf {
        with_suffix(&checkpoint_stem(path), &format!(".{EXTENSION}"))
    }

    /// Write weights atomically; returns the final file path.
    pub fn save<B: Backend>(&self, model: &VitClassifier<B>, path: &Path) -> Result<PathBuf> {
        let stem = checkpoint_stem(path);
        if let Some(parent) = stem.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create checkpoint directory '{}'", parent.display()))?;
        }

        let name = stem
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let staging = stem.with_file_name(format!(".{name}-staging"));
        let staged  = Self::file_path(&staging);
        let target  = Self::file_path(&stem);

        self.recorder
            .record(model.clone().into_record(), recorder_arg(&staging))
            .with_context(|| format!("Failed to write checkpoint '{}'", staged.display()))?;

        if let Err(e) = fs::rename(&staged, &target) {
            fs::remove_file(&staged).ok();
            return Err(e).with_context(|| format!("Failed to move checkpoint into '{}'", target.display()));
        }

        tracing::debug!("Saved checkpoint '{}'", target.display());
        Ok(target)
    }

    /// Build a model from `cfg` and load the weights at `path` into it.
    ///
    /// Fails with `CoreError::CheckpointLoad` if the file cannot be read
    /// or any parameter shape differs from what `cfg` builds.
    pub fn load<B: Backend>(
        &self,
        cfg:    &VitConfig,
        path:   &Path,
        device: &B::Device,
    ) -> Result<VitClassifier<B>> {
        let target = Self::file_path(path);
        let fresh: VitClassifier<B> = cfg.init(device);

        let record: VitClassifierRecord<B> = self
            .recorder
            .load(recorder_arg(&checkpoint_stem(path)), device)
            .map_err(|e| CoreError::CheckpointLoad { path: target.clone(), reason: e.to_string() })?;

        let expected = fresh.parameter_shapes();
        let found    = record.parameter_shapes();
        if expected != found {
            return Err(CoreError::CheckpointLoad {
                path:   target,
                reason: describe_mismatch(&expected, &found),
            }
            .into());
        }

        tracing::info!("Loaded checkpoint '{}'", target.display());
        Ok(fresh.load_record(record))
    }

    /// Pretty-printed JSON side file (run config, class names, ...).
    pub fn save_json<T: Serialize>(&self, value: &T, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(())
    }

    pub fn load_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let json = fs::read_to_string(path).with_context(|| {
            format!("Cannot read '{}'. Have you run training first?", path.display())
        })?;
        serde_json::from_str(&json).with_context(|| format!("Malformed JSON in '{}'", path.display()))
    }
}

impl<B: Backend> ModelStore<VitClassifier<B>> for CheckpointManager {
    fn write(&self, model: &VitClassifier<B>, path: &Path) -> Result<()> {
        self.save(model, path).map(|_| ())
    }
}

/// Strip a trailing `.mpk.gz` so the recorder can add it back.
fn checkpoint_stem(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    match text.strip_suffix(".mpk.gz") {
        Some(stem) => PathBuf::from(stem),
        None       => path.to_path_buf(),
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut text = path.as_os_str().to_owned();
    text.push(suffix);
    PathBuf::from(text)
}

/// The recorder replaces the last extension with `mpk.gz`, so it is
/// handed `<stem>.mpk` to land exactly on `<stem>.mpk.gz`.
fn recorder_arg(stem: &Path) -> PathBuf {
    with_suffix(stem, ".mpk")
}

fn describe_mismatch(expected: &[(String, Vec<usize>)], found: &[(String, Vec<usize>)]) -> String {
    if expected.len() != found.len() {
        return format!(
            "model expects {} shaped tensors, checkpoint has {}",
            expected.len(),
            found.len()
        );
    }
    expected
        .iter()
        .zip(found)
        .find(|(e, f)| e != f)
        .map(|((name, e), (_, f))| format!("'{name}' expected shape {e:?}, checkpoint has {f:?}"))
        .unwrap_or_else(|| "parameter shapes differ".to_string())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::domain::metrics::{EpochMetrics, PassStats};
    use crate::ml::model::tiny_config;

    type TestBackend = NdArray<f32>;

    fn history(fold: usize, val_loss: f64, val_acc: f64) -> FoldHistory {
        FoldHistory {
            fold,
            epochs: vec![EpochMetrics::new(
                1,
                PassStats::new(1.0, 0.5),
                PassStats::new(val_loss, val_acc),
                1e-3,
            )],
        }
    }

    #[test]
    fn test_file_path_normalisation() {
        assert_eq!(CheckpointManager::file_path(Path::new("out/vit")), PathBuf::from("out/vit.mpk.gz"));
        assert_eq!(CheckpointManager::file_path(Path::new("out/vit.mpk.gz")), PathBuf::from("out/vit.mpk.gz"));
        assert_eq!(CheckpointManager::file_path(Path::new("out/vit.pth")), PathBuf::from("out/vit.pth.mpk.gz"));
    }

    #[test]
    fn test_dotted_checkpoint_name_is_kept() {
        let tmp    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let cfg    = tiny_config(2);
        let model: VitClassifier<TestBackend> = cfg.init(&device);
        let store  = CheckpointManager::new();

        let path    = tmp.path().join("vit.v2");
        let written = store.save(&model, &path).unwrap();
        assert_eq!(written, tmp.path().join("vit.v2.mpk.gz"));
        assert!(written.exists());
        assert!(!tmp.path().join("vit.mpk.gz").exists());
        assert!(store.load::<TestBackend>(&cfg, &path, &device).is_ok());
    }

    #[test]
    fn test_policy_paths() {
        let base = Path::new("ckpt/vit.mpk.gz");
        assert_eq!(CheckpointPolicy::Overwrite.path_for_fold(base, 2), base);
        assert_eq!(
            CheckpointPolicy::KeepAll.path_for_fold(base, 2),
            PathBuf::from("ckpt/vit_fold2")
        );
        assert_eq!(
            CheckpointPolicy::KeepBest(SelectionMetric::ValLoss).path_for_fold(base, 3),
            base
        );
    }

    #[test]
    fn test_keep_all_also_fills_base_on_last_fold() {
        let base = Path::new("ckpt/vit");
        assert_eq!(
            CheckpointPolicy::KeepAll.targets_for_fold(base, 1, 3),
            vec![PathBuf::from("ckpt/vit_fold1")]
        );
        assert_eq!(
            CheckpointPolicy::KeepAll.targets_for_fold(base, 3, 3),
            vec![PathBuf::from("ckpt/vit_fold3"), PathBuf::from("ckpt/vit")]
        );
        assert_eq!(CheckpointPolicy::Overwrite.targets_for_fold(base, 3, 3), vec![PathBuf::from("ckpt/vit")]);
    }

    #[test]
    fn test_keep_best_only_writes_improvements() {
        let policy = CheckpointPolicy::KeepBest(SelectionMetric::ValAccuracy);
        let mut best = BestFold::default();
        assert!(best.should_write(policy, &history(1, 1.0, 0.6)));
        assert!(!best.should_write(policy, &history(2, 1.0, 0.5)));
        assert!(best.should_write(policy, &history(3, 1.0, 0.7)));
        assert_eq!(best.best(), Some(0.7));
        assert!(!best.should_write(policy, &FoldHistory { fold: 4, epochs: vec![] }));
    }

    #[test]
    fn test_overwrite_always_writes() {
        let mut best = BestFold::default();
        assert!(best.should_write(CheckpointPolicy::Overwrite, &history(1, 1.0, 0.9)));
        assert!(best.should_write(CheckpointPolicy::Overwrite, &history(2, 1.0, 0.1)));
    }

    #[test]
    fn test_round_trip_is_exact() {
        let tmp    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let cfg    = tiny_config(3);
        let model: VitClassifier<TestBackend> = cfg.init(&device);

        let path    = tmp.path().join("nested/vit");
        let written = CheckpointManager::new().save(&model, &path).unwrap();
        assert!(written.ends_with("vit.mpk.gz"));
        assert!(written.exists());
        // no staging file left behind
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("nested"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());

        let loaded: VitClassifier<TestBackend> =
            CheckpointManager::new().load(&cfg, &written, &device).unwrap();

        let images = Tensor::<TestBackend, 4>::random(
            [2, 3, 8, 8],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let a: Vec<f32> = model.forward(images.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.forward(images).into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shape_mismatch_is_a_load_error() {
        let tmp    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model: VitClassifier<TestBackend> = tiny_config(3).init(&device);
        let path   = tmp.path().join("vit");
        CheckpointManager::new().save(&model, &path).unwrap();

        let err = CheckpointManager::new()
            .load::<TestBackend>(&tiny_config(5), &path, &device)
            .unwrap_err();
        match err.downcast_ref::<CoreError>() {
            Some(CoreError::CheckpointLoad { reason, .. }) => assert!(reason.contains("head.weight")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_a_load_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = CheckpointManager::new()
            .load::<TestBackend>(&tiny_config(2), &tmp.path().join("absent"), &Default::default())
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::CheckpointLoad { .. })));
    }

    #[test]
    fn test_json_side_files() {
        let tmp  = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cfg/policy.json");
        let mgr  = CheckpointManager::new();
        mgr.save_json(&CheckpointPolicy::KeepBest(SelectionMetric::ValLoss), &path).unwrap();
        let back: CheckpointPolicy = mgr.load_json(&path).unwrap();
        assert_eq!(back, CheckpointPolicy::KeepBest(SelectionMetric::ValLoss));
    }
}
