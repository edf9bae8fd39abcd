// ============================================================
// Layer 2 — Cross-Validation Orchestrator
// ============================================================
// Drives the whole k-fold run as a small state machine:
//
//   Idle → Partitioning → [Training(n) → Checkpointing(n)] × k → Done
//
// For each fold, strictly one after another:
//   1. FoldTrainer builds a fresh model and trains it
//   2. every epoch's scalars go to the sink at the global step
//   3. the CheckpointPolicy decides whether / where to write
//
// The global step belongs to the orchestrator and is never reset
// between folds. A failing fold aborts the run before its
// checkpoint stage, so no partially trained weights are written.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::data::splitter::FoldPartitioner;
use crate::domain::{
    metrics::{FoldHistory, FoldSummary},
    traits::{EpochSteps, ModelFactory, ModelStore, OptimizerFactory, ScalarSink},
};
use crate::infra::checkpoint::{BestFold, CheckpointPolicy};
use crate::ml::fold_trainer::FoldTrainer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Partitioning,
    Training { fold: usize },
    Checkpointing { fold: usize },
    Done,
}

/// Monotonic step shared by every scalar of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GlobalStep(u64);

impl GlobalStep {
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Return the current step and move to the next one.
    pub fn advance(&mut self) -> u64 {
        let current = self.0;
        self.0 += 1;
        current
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct CrossValidationReport {
    pub histories:   Vec<FoldHistory>,
    /// Checkpoint paths in write order (may repeat under Overwrite)
    pub checkpoints: Vec<PathBuf>,
    pub summary:     FoldSummary,
}

pub struct CrossValidationOrchestrator {
    partitioner: FoldPartitioner,
    trainer:     FoldTrainer,
    policy:      CheckpointPolicy,
    checkpoint:  PathBuf,
    state:       RunState,
    step:        GlobalStep,
    transitions: Vec<RunState>,
}

impl CrossValidationOrchestrator {
    pub fn new(
        partitioner: FoldPartitioner,
        trainer:     FoldTrainer,
        policy:      CheckpointPolicy,
        checkpoint:  impl Into<PathBuf>,
    ) -> Self {
        Self {
            partitioner,
            trainer,
            policy,
            checkpoint:  checkpoint.into(),
            state:       RunState::Idle,
            step:        GlobalStep::default(),
            transitions: vec![RunState::Idle],
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state entered so far, starting with Idle.
    pub fn transitions(&self) -> &[RunState] {
        &self.transitions
    }

    pub fn global_step(&self) -> GlobalStep {
        self.step
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint
    }

    fn enter(&mut self, state: RunState) {
        tracing::debug!("Cross-validation state: {:?} → {:?}", self.state, state);
        self.state = state;
        self.transitions.push(state);
    }

    /// Run k-fold cross-validation over a dataset described by its labels.
    pub fn run<MF, OF, S, St, Sk>(
        &mut self,
        labels:     &[usize],
        models:     &MF,
        optimizers: &OF,
        steps:      &S,
        store:      &St,
        sink:       &mut Sk,
    ) -> Result<CrossValidationReport>
    where
        MF: ModelFactory,
        OF: OptimizerFactory<MF::Model>,
        S:  EpochSteps<MF::Model, OF::Optimizer>,
        St: ModelStore<MF::Model>,
        Sk: ScalarSink,
    {
        self.enter(RunState::Partitioning);
        let folds = self
            .partitioner
            .split(labels)
            .context("Cannot partition the dataset into folds")?;
        tracing::info!("Partitioned {} samples into {} folds", labels.len(), folds.len());

        let mut histories   = Vec::with_capacity(folds.len());
        let mut checkpoints = Vec::new();
        let mut best        = BestFold::default();

        for fold in &folds {
            let number = fold.number();
            self.enter(RunState::Training { fold: number });

            let step    = &mut self.step;
            let outcome = self.trainer.run_observed(fold, models, optimizers, steps, |metrics| {
                let at = step.advance();
                for (tag, value) in metrics.scalars() {
                    sink.add_scalar(tag, value, at)?;
                }
                Ok(())
            })?;

            self.enter(RunState::Checkpointing { fold: number });
            if best.should_write(self.policy, &outcome.history) {
                for path in self.policy.targets_for_fold(&self.checkpoint, number, folds.len()) {
                    store
                        .write(&outcome.model, &path)
                        .with_context(|| format!("Cannot write checkpoint for fold {number}"))?;
                    tracing::info!("Fold {}: checkpoint written to '{}'", number, path.display());
                    checkpoints.push(path);
                }
            } else {
                tracing::info!("Fold {}: no improvement, checkpoint kept", number);
            }

            histories.push(outcome.history);
        }

        self.enter(RunState::Done);
        let summary = FoldSummary::from_histories(&histories);
        tracing::info!(
            "Cross-validation done: val acc {:.4} ± {:.4}, val loss {:.4} ± {:.4} over {} folds",
            summary.mean_val_accuracy,
            summary.std_val_accuracy,
            summary.mean_val_loss,
            summary.std_val_loss,
            summary.folds
        );

        Ok(CrossValidationReport { histories, checkpoints, summary })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::domain::{error::CoreError, metrics::SelectionMetric};
    use crate::infra::metrics::MemorySink;
    use crate::ml::fold_trainer::fakes::*;

    /// Remembers which model went to which path.
    #[derive(Default)]
    struct RecordingStore {
        writes: RefCell<Vec<(usize, PathBuf)>>,
    }

    impl ModelStore<FakeModel> for RecordingStore {
        fn write(&self, model: &FakeModel, path: &Path) -> Result<()> {
            self.writes.borrow_mut().push((model.id, path.to_path_buf()));
            Ok(())
        }
    }

    fn orchestrator(k: usize, epochs: usize, policy: CheckpointPolicy) -> CrossValidationOrchestrator {
        CrossValidationOrchestrator::new(
            FoldPartitioner::new(k, 7),
            FoldTrainer::new(epochs, 2),
            policy,
            "ckpt/vit",
        )
    }

    fn labels() -> Vec<usize> {
        vec![0, 0, 0, 1, 1, 1]
    }

    #[test]
    fn test_one_epoch_three_folds() {
        let factory = FakeFactory::default();
        let steps   = FakeSteps::default();
        let store   = RecordingStore::default();
        let mut sink = MemorySink::default();
        let mut cv   = orchestrator(3, 1, CheckpointPolicy::Overwrite);

        let report = cv.run(&labels(), &factory, &factory, &steps, &store, &mut sink).unwrap();

        assert_eq!(report.histories.len(), 3);
        assert!(report.histories.iter().all(|h| h.epochs.len() == 1));
        let folds: Vec<usize> = report.histories.iter().map(|h| h.fold).collect();
        assert_eq!(folds, vec![1, 2, 3]);

        let writes = store.writes.borrow();
        assert_eq!(writes.len(), 3);
        assert!(writes.iter().all(|(_, p)| p == Path::new("ckpt/vit")));
        // a fresh model per fold, the last one ends up in the file
        let ids: Vec<usize> = writes.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(*factory.created.borrow(), 3);
        assert_eq!(cv.state(), RunState::Done);
    }

    #[test]
    fn test_global_step_never_resets() {
        let factory = FakeFactory::default();
        let steps   = FakeSteps::default();
        let store   = RecordingStore::default();
        let mut sink = MemorySink::default();
        let mut cv   = orchestrator(2, 3, CheckpointPolicy::Overwrite);

        cv.run(&labels(), &factory, &factory, &steps, &store, &mut sink).unwrap();

        let val_acc_steps: Vec<u64> = sink.series("val_acc").iter().map(|(s, _)| *s).collect();
        assert_eq!(val_acc_steps, vec![0, 1, 2, 3, 4, 5]);
        let epochs: Vec<f64> = sink.series("epoch").iter().map(|(_, v)| *v).collect();
        assert_eq!(epochs, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
        // six tags per epoch
        assert_eq!(sink.records.len(), 6 * 6);
        assert_eq!(cv.global_step().value(), 6);
    }

    #[test]
    fn test_state_sequence() {
        let factory = FakeFactory::default();
        let steps   = FakeSteps::default();
        let store   = RecordingStore::default();
        let mut sink = MemorySink::default();
        let mut cv   = orchestrator(2, 1, CheckpointPolicy::Overwrite);

        cv.run(&labels(), &factory, &factory, &steps, &store, &mut sink).unwrap();
        assert_eq!(
            cv.transitions(),
            &[
                RunState::Idle,
                RunState::Partitioning,
                RunState::Training { fold: 1 },
                RunState::Checkpointing { fold: 1 },
                RunState::Training { fold: 2 },
                RunState::Checkpointing { fold: 2 },
                RunState::Done,
            ]
        );
    }

    #[test]
    fn test_keep_all_writes_each_fold_and_the_last_to_base() {
        let factory = FakeFactory::default();
        let steps   = FakeSteps::default();
        let store   = RecordingStore::default();
        let mut sink = MemorySink::default();
        let mut cv   = orchestrator(3, 1, CheckpointPolicy::KeepAll);

        let report = cv.run(&labels(), &factory, &factory, &steps, &store, &mut sink).unwrap();
        assert_eq!(
            report.checkpoints,
            vec![
                PathBuf::from("ckpt/vit_fold1"),
                PathBuf::from("ckpt/vit_fold2"),
                PathBuf::from("ckpt/vit_fold3"),
                PathBuf::from("ckpt/vit"),
            ]
        );
        // the shared path holds the last fold's model
        let writes = store.writes.borrow();
        assert_eq!(writes.last(), Some(&(3, PathBuf::from("ckpt/vit"))));
    }

    #[test]
    fn test_keep_best_skips_worse_folds() {
        let factory = FakeFactory::default();
        // val_loss = 1 - score → 0.4, 0.6, 0.1
        let steps   = FakeSteps { fold_scores: vec![0.6, 0.4, 0.9], ..Default::default() };
        let store   = RecordingStore::default();
        let mut sink = MemorySink::default();
        let mut cv   = orchestrator(3, 1, CheckpointPolicy::KeepBest(SelectionMetric::ValLoss));

        cv.run(&labels(), &factory, &factory, &steps, &store, &mut sink).unwrap();
        let ids: Vec<usize> = store.writes.borrow().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_insufficient_samples_fail_before_training() {
        let factory = FakeFactory::default();
        let steps   = FakeSteps::default();
        let store   = RecordingStore::default();
        let mut sink = MemorySink::default();
        let mut cv   = orchestrator(4, 1, CheckpointPolicy::Overwrite);

        let err = cv.run(&labels(), &factory, &factory, &steps, &store, &mut sink).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::InsufficientSamples { folds: 4, .. })
        ));
        assert_eq!(*steps.train_calls.borrow(), 0);
        assert!(store.writes.borrow().is_empty());
        assert!(sink.records.is_empty());
    }

    #[test]
    fn test_divergence_stops_before_that_folds_checkpoint() {
        let factory = FakeFactory::default();
        // third training pass = fold 2, epoch 1
        let steps   = FakeSteps { diverge_at: Some(3), ..Default::default() };
        let store   = RecordingStore::default();
        let mut sink = MemorySink::default();
        let mut cv   = orchestrator(3, 2, CheckpointPolicy::Overwrite);

        let err = cv.run(&labels(), &factory, &factory, &steps, &store, &mut sink).unwrap_err();
        assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::Diverged { .. })));

        let ids: Vec<usize> = store.writes.borrow().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(cv.state(), RunState::Training { fold: 2 });
    }
}
