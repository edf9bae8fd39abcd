// ============================================================
// Layer 3 — Core Traits (Collaborator Contracts)
// ============================================================
// The cross-validation core is written against these traits,
// not against Burn. The ml/ and infra/ layers provide the real
// implementations; tests provide small fakes.
//
//   ModelFactory      → builds a fresh, untrained model
//   OptimizerFactory  → builds an optimizer for a model
//   LearningRate      → exposes an optimizer's current rate
//   EpochSteps        → one training pass / one evaluation pass
//   ModelStore        → writes trained weights to a path
//   ScalarSink        → receives (tag, value, step) triples

use anyhow::Result;
use std::path::Path;

use crate::domain::metrics::PassStats;

// ─── ModelFactory ─────────────────────────────────────────────────────────────
/// Builds a freshly initialised model. Every call yields an
/// independent instance with the same parameter shapes.
pub trait ModelFactory {
    type Model;

    fn create(&self, num_classes: usize) -> Self::Model;
}

// ─── Optimizer ────────────────────────────────────────────────────────────────
/// Anything that can report the learning rate of its next step.
pub trait LearningRate {
    fn current_lr(&self) -> f64;
}

/// Builds a step-capable optimizer for one model's lifetime.
pub trait OptimizerFactory<M> {
    type Optimizer: LearningRate;

    fn create(&self, model: &M) -> Self::Optimizer;
}

// ─── EpochSteps ───────────────────────────────────────────────────────────────
/// The single-epoch train and evaluate passes.
///
/// Index slices refer to the dataset the implementation owns.
/// Training consumes the model and hands back the updated one,
/// so epoch N's evaluation always sees epoch N's weights.
pub trait EpochSteps<M, O> {
    fn train_one_epoch(
        &self,
        model:     M,
        optimizer: &mut O,
        indices:   &[usize],
        epoch:     usize,
    ) -> Result<(M, PassStats)>;

    fn evaluate(&self, model: &M, indices: &[usize], epoch: usize) -> Result<PassStats>;
}

// ─── ModelStore ───────────────────────────────────────────────────────────────
/// Persists a model's parameters to a single path, replacing
/// whatever was there.
pub trait ModelStore<M> {
    fn write(&self, model: &M, path: &Path) -> Result<()>;
}

// ─── ScalarSink ───────────────────────────────────────────────────────────────
/// Append-only receiver of named scalars keyed by a global step.
pub trait ScalarSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()>;
}
