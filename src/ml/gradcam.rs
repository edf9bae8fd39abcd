// ============================================================
// Layer 5 — Grad-CAM for the Vision Transformer
// ============================================================
// Explains a prediction by asking which patches the target
// encoder block's input tokens pushed toward the chosen class.
//
//   tokens  = embed(images) → blocks[0..t]            [B, N+1, D]
//   act     = tokens.detach().require_grad()
//   logits  = classify(blocks[t..L](act))             [B, K]
//   score   = Σ logits · one_hot(class)
//   g       = ∂score/∂act
//
//   drop the class token, then per image:
//   w[d]    = mean over patches of g[:, d]
//   cam[n]  = ReLU( Σ_d act[n, d] · w[d] )
//   reshape to the √N × √N patch grid, min-max to [0, 1]
//
// The model must live on an autodiff backend. Dropout should be
// disabled in its config or the maps are not reproducible.

use anyhow::{anyhow, ensure, Result};
use burn::{
    prelude::*,
    tensor::{activation::softmax, backend::AutodiffBackend},
};

use crate::ml::model::VitClassifier;

/// Saliency over the patch grid for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct SaliencyMap {
    /// Row-major grid × grid values in [0, 1]
    pub values: Vec<f32>,
    pub grid:   usize,
    /// Class the map explains
    pub class:  usize,
    /// Softmax probability of that class
    pub probability: f32,
}

pub struct GradCam<'a, B: AutodiffBackend> {
    model:        &'a VitClassifier<B>,
    target_block: usize,
}

impl<'a, B: AutodiffBackend> GradCam<'a, B> {
    /// `target_block` defaults to the last encoder block.
    pub fn new(model: &'a VitClassifier<B>, target_block: Option<usize>) -> Result<Self> {
        let layers = model.num_layers();
        let target_block = target_block.unwrap_or(layers.saturating_sub(1));
        ensure!(
            target_block < layers,
            "target block {} does not exist; the model has {} blocks",
            target_block,
            layers
        );
        Ok(Self { model, target_block })
    }

    pub fn target_block(&self) -> usize {
        self.target_block
    }

    /// One map per image. Each image explains `classes[i]` when given,
    /// otherwise its own predicted class.
    pub fn compute(&self, images: Tensor<B, 4>, classes: Option<&[usize]>) -> Result<Vec<SaliencyMap>> {
        let device = images.device();
        let layers = self.model.num_layers();

        let tokens = self.model.embed(images);
        let tokens = self.model.forward_blocks(tokens, 0..self.target_block);
        let act    = tokens.detach().require_grad();

        let out    = self.model.forward_blocks(act.clone(), self.target_block..layers);
        let logits = self.model.classify(out);
        let [batch, num_classes] = logits.dims();

        let probs: Vec<f32> = host_vec(softmax(logits.clone().detach(), 1))?;
        let targets: Vec<usize> = match classes {
            Some(given) => {
                ensure!(
                    given.len() == batch,
                    "got {} target classes for a batch of {}",
                    given.len(),
                    batch
                );
                if let Some(&bad) = given.iter().find(|&&c| c >= num_classes) {
                    return Err(anyhow!("target class {bad} is outside [0, {num_classes})"));
                }
                given.to_vec()
            }
            None => argmax_rows(&probs, num_classes),
        };

        let mut mask = vec![0.0f32; batch * num_classes];
        for (row, &class) in targets.iter().enumerate() {
            mask[row * num_classes + class] = 1.0;
        }
        let mask  = Tensor::<B, 2>::from_data(TensorData::new(mask, [batch, num_classes]), &device);
        let score = (logits * mask).sum();
        let grads = score.backward();

        let grad = act
            .grad(&grads)
            .ok_or_else(|| anyhow!("no gradient reached block {}", self.target_block))?;
        let act  = act.inner();

        let [b, n_tokens, d_model] = act.dims();
        let patches = n_tokens - 1;
        let grid    = (patches as f64).sqrt().round() as usize;
        ensure!(grid * grid == patches, "{patches} patch tokens do not form a square grid");

        let act  = act.slice([0..b, 1..n_tokens, 0..d_model]);
        let grad = grad.slice([0..b, 1..n_tokens, 0..d_model]);

        let weights = grad.mean_dim(1);                                  // [B, 1, D]
        let cam     = (act * weights).sum_dim(2).clamp_min(0.0);         // [B, N, 1]
        let cam: Vec<f32> = host_vec(cam.reshape([b, patches]))?;

        Ok(targets
            .iter()
            .enumerate()
            .map(|(i, &class)| SaliencyMap {
                values:      min_max(&cam[i * patches..(i + 1) * patches]),
                grid,
                class,
                probability: probs[i * num_classes + class],
            })
            .collect())
    }
}

fn host_vec<BB: Backend, const D: usize>(t: Tensor<BB, D>) -> Result<Vec<f32>> {
    t.into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| anyhow!("cannot read tensor data: {e:?}"))
}

fn argmax_rows(values: &[f32], width: usize) -> Vec<usize> {
    values
        .chunks(width)
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0
        })
        .collect()
}

/// Scale to [0, 1]; a flat map becomes all zeros.
fn min_max(values: &[f32]) -> Vec<f32> {
    let lo = values.iter().copied().fold(f32::INFINITY, f32::min);
    let hi = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = hi - lo;
    if !range.is_finite() || range <= f32::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - lo) / range).collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    use crate::ml::model::tiny_config;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn batch(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 4> {
        Tensor::random([2, 3, 8, 8], burn::tensor::Distribution::Normal(0.0, 1.0), device)
    }

    #[test]
    fn test_one_normalised_map_per_image() {
        let device = Default::default();
        let model: VitClassifier<TestBackend> = tiny_config(3).init(&device);
        let cam    = GradCam::new(&model, None).unwrap();
        assert_eq!(cam.target_block(), 1);

        let maps = cam.compute(batch(&device), None).unwrap();
        assert_eq!(maps.len(), 2);
        for m in &maps {
            assert_eq!(m.grid, 2);
            assert_eq!(m.values.len(), 4);
            assert!(m.values.iter().all(|v| (0.0..=1.0).contains(v)));
            assert!(m.class < 3);
            assert!(m.probability > 0.0 && m.probability <= 1.0);
        }
    }

    #[test]
    fn test_explicit_classes_are_used() {
        let device = Default::default();
        let model: VitClassifier<TestBackend> = tiny_config(3).init(&device);
        let cam    = GradCam::new(&model, Some(0)).unwrap();

        let maps = cam.compute(batch(&device), Some(&[2, 1])).unwrap();
        assert_eq!(maps[0].class, 2);
        assert_eq!(maps[1].class, 1);

        assert!(cam.compute(batch(&device), Some(&[5, 0])).is_err());
        assert!(cam.compute(batch(&device), Some(&[0])).is_err());
    }

    #[test]
    fn test_target_block_out_of_range() {
        let device = Default::default();
        let model: VitClassifier<TestBackend> = tiny_config(2).init(&device);
        assert!(GradCam::new(&model, Some(2)).is_err());
    }

    #[test]
    fn test_helpers() {
        assert_eq!(argmax_rows(&[0.1, 0.7, 0.2, 0.9, 0.05, 0.05], 3), vec![1, 0]);
        assert_eq!(min_max(&[2.0, 4.0, 3.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(min_max(&[1.0, 1.0]), vec![0.0, 0.0]);
    }
}
