// ============================================================
// Layer 5 — Fold Trainer
// ============================================================
// Owns one model's lifecycle for one fold:
//
//   model = factory.create(num_classes)
//   optim = optimizer_factory.create(&model)
//   for epoch in 1..=epochs:
//       lr            = optim.current_lr()
//       model, train  = steps.train_one_epoch(model, optim, train_indices)
//       val           = steps.evaluate(&model, val_indices)
//       history.push(EpochMetrics { .. })
//
// Any error from a pass aborts the fold immediately. There is
// no retry: a diverged model must never reach a checkpoint.

use anyhow::{Context, Result};

use crate::domain::{
    fold::Fold,
    metrics::{EpochMetrics, FoldHistory},
    traits::{EpochSteps, LearningRate, ModelFactory, OptimizerFactory},
};

/// A trained model plus the metrics recorded while training it.
pub struct FoldOutcome<M> {
    pub model:   M,
    pub history: FoldHistory,
}

#[derive(Debug, Clone, Copy)]
pub struct FoldTrainer {
    epochs:      usize,
    num_classes: usize,
}

impl FoldTrainer {
    pub fn new(epochs: usize, num_classes: usize) -> Self {
        Self { epochs, num_classes }
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn run<MF, OF, S>(
        &self,
        fold:       &Fold,
        models:     &MF,
        optimizers: &OF,
        steps:      &S,
    ) -> Result<FoldOutcome<MF::Model>>
    where
        MF: ModelFactory,
        OF: OptimizerFactory<MF::Model>,
        S:  EpochSteps<MF::Model, OF::Optimizer>,
    {
        self.run_observed(fold, models, optimizers, steps, |_| Ok(()))
    }

    /// Like `run`, but hands every finished epoch to `on_epoch`
    /// before the next one starts. An error from `on_epoch` aborts
    /// the fold.
    pub fn run_observed<MF, OF, S, F>(
        &self,
        fold:         &Fold,
        models:       &MF,
        optimizers:   &OF,
        steps:        &S,
        mut on_epoch: F,
    ) -> Result<FoldOutcome<MF::Model>>
    where
        MF: ModelFactory,
        OF: OptimizerFactory<MF::Model>,
        S:  EpochSteps<MF::Model, OF::Optimizer>,
        F:  FnMut(&EpochMetrics) -> Result<()>,
    {
        let mut model     = models.create(self.num_classes);
        let mut optimizer = optimizers.create(&model);
        let mut epochs    = Vec::with_capacity(self.epochs);

        tracing::info!(
            "Fold {}: {} train / {} val samples, {} epochs",
            fold.number(),
            fold.train_indices.len(),
            fold.val_indices.len(),
            self.epochs
        );

        for epoch in 1..=self.epochs {
            // Rate in effect for this epoch's updates
            let lr = optimizer.current_lr();

            let (trained, train) = steps
                .train_one_epoch(model, &mut optimizer, &fold.train_indices, epoch)
                .with_context(|| format!("fold {} epoch {}: training pass failed", fold.number(), epoch))?;
            model = trained;

            let val = steps
                .evaluate(&model, &fold.val_indices, epoch)
                .with_context(|| format!("fold {} epoch {}: validation pass failed", fold.number(), epoch))?;

            let metrics = EpochMetrics::new(epoch, train, val, lr);
            println!(
                "Fold {} | Epoch {:>3}/{} | train loss {:.4} acc {:.4} | val loss {:.4} acc {:.4} | lr {:.2e}",
                fold.number(),
                epoch,
                self.epochs,
                metrics.train_loss,
                metrics.train_accuracy,
                metrics.val_loss,
                metrics.val_accuracy,
                metrics.learning_rate,
            );
            on_epoch(&metrics)?;
            epochs.push(metrics);
        }

        Ok(FoldOutcome {
            model,
            history: FoldHistory { fold: fold.number(), epochs },
        })
    }
}
