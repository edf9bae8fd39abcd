// ============================================================
// Layer 5 — Learning Rate Schedule + Optimizer Handle
// ============================================================
// Burn optimizers take the learning rate as an argument to
// `step`, they do not store it. ScheduledOptimizer pairs the
// Adam state with a per-epoch cosine schedule so the rest of
// the code can ask "what rate is in effect right now?".
//
//   lr(e) = lr0 · [ (1 + cos(π·e/E)) / 2 · (1 − lrf) + lrf ]
//
// e counts completed epochs; E is the total. The rate starts at
// lr0 and decays to lr0·lrf.

use burn::{
    module::AutodiffModule,
    optim::{
        adaptor::OptimizerAdaptor, decay::WeightDecayConfig, Adam, AdamConfig, GradientsParams,
        Optimizer,
    },
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::domain::traits::LearningRate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CosineSchedule {
    pub base_lr:      f64,
    /// Final rate as a fraction of base_lr
    pub final_factor: f64,
    pub total_epochs: usize,
}

impl CosineSchedule {
    pub fn new(base_lr: f64, final_factor: f64, total_epochs: usize) -> Self {
        Self { base_lr, final_factor, total_epochs }
    }

    /// Rate after `completed` epochs.
    pub fn lr_at(&self, completed: usize) -> f64 {
        if self.total_epochs == 0 {
            return self.base_lr;
        }
        let progress = completed.min(self.total_epochs) as f64 / self.total_epochs as f64;
        let cosine   = (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
        self.base_lr * (cosine * (1.0 - self.final_factor) + self.final_factor)
    }
}

/// Adam with decoupled weight decay, stepped at the scheduled rate.
pub struct ScheduledOptimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    inner:     OptimizerAdaptor<Adam, M, B>,
    schedule:  CosineSchedule,
    completed: usize,
}

impl<M, B> ScheduledOptimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    pub fn adam(schedule: CosineSchedule, weight_decay: f64) -> Self {
        let inner = AdamConfig::new()
            .with_epsilon(1e-8)
            .with_weight_decay(Some(WeightDecayConfig::new(weight_decay as f32)))
            .init();
        Self { inner, schedule, completed: 0 }
    }

    /// One parameter update at the current rate.
    pub fn step(&mut self, model: M, grads: GradientsParams) -> M {
        let lr = self.current_lr();
        self.inner.step(lr, model, grads)
    }

    /// Advance the schedule by one epoch.
    pub fn end_epoch(&mut self) {
        self.completed += 1;
    }
}

impl<M, B> LearningRate for ScheduledOptimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    fn current_lr(&self) -> f64 {
        self.schedule.lr_at(self.completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_endpoints() {
        let s = CosineSchedule::new(1e-3, 0.01, 10);
        assert!((s.lr_at(0) - 1e-3).abs() < 1e-15);
        assert!((s.lr_at(10) - 1e-5).abs() < 1e-15);
        // halfway: (0.5 · 0.99 + 0.01) · lr0
        assert!((s.lr_at(5) - 1e-3 * 0.505).abs() < 1e-12);
        // never past the end
        assert_eq!(s.lr_at(50), s.lr_at(10));
    }

    #[test]
    fn test_monotonic_decay() {
        let s = CosineSchedule::new(0.1, 0.0, 8);
        for e in 0..8 {
            assert!(s.lr_at(e + 1) <= s.lr_at(e));
        }
    }

    #[test]
    fn test_weight_decayed_adam_steps_down_the_schedule() {
        use burn::backend::{Autodiff, NdArray};
        use crate::ml::model::VitClassifier;

        type TestBackend = Autodiff<NdArray<f32>>;

        let mut optim: ScheduledOptimizer<VitClassifier<TestBackend>, TestBackend> =
            ScheduledOptimizer::adam(CosineSchedule::new(1e-3, 0.01, 4), 5e-5);
        assert_eq!(optim.current_lr(), 1e-3);
        optim.end_epoch();
        assert!(optim.current_lr() < 1e-3);
    }

    #[test]
    fn test_zero_epochs_keeps_base_rate() {
        assert_eq!(CosineSchedule::new(0.2, 0.1, 0).lr_at(3), 0.2);
    }
}
