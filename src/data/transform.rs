// ============================================================
// Layer 4 — Image Transform
// ============================================================
// Turns a decoded image into the flat CHW float buffer the
// batcher expects:
//
//   decode → RGB8 → resize (image_size²) → [flip] → /255 → (x - 0.5) / 0.5
//
// The random horizontal flip is only enabled for training
// subsets. Validation and test transforms are deterministic.

use anyhow::{Context, Result};
use image::{imageops, imageops::FilterType, RgbImage};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-channel normalisation constants
const MEAN: [f32; 3] = [0.5, 0.5, 0.5];
const STD:  [f32; 3] = [0.5, 0.5, 0.5];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageTransform {
    /// Output height and width in pixels
    pub image_size: u32,

    /// Probability of a horizontal flip (0.0 disables augmentation)
    pub flip_prob: f64,
}

impl ImageTransform {
    /// Deterministic transform for validation, test and inference.
    pub fn eval(image_size: u32) -> Self {
        Self { image_size, flip_prob: 0.0 }
    }

    /// Training transform with random horizontal flips.
    pub fn train(image_size: u32) -> Self {
        Self { image_size, flip_prob: 0.5 }
    }

    /// Number of f32 values produced per image.
    pub fn output_len(&self) -> usize {
        3 * (self.image_size as usize) * (self.image_size as usize)
    }

    /// Decode `path` and return normalised CHW pixels.
    pub fn load(&self, path: &Path) -> Result<Vec<f32>> {
        let rgb = load_resized(path, self.image_size)?;
        Ok(self.apply(rgb))
    }

    /// Normalise an already-resized RGB image into CHW floats.
    pub fn apply(&self, mut rgb: RgbImage) -> Vec<f32> {
        if self.flip_prob > 0.0 && rand::thread_rng().gen_bool(self.flip_prob.min(1.0)) {
            imageops::flip_horizontal_in_place(&mut rgb);
        }

        let (w, h)  = rgb.dimensions();
        let plane   = (w * h) as usize;
        let mut out = vec![0.0f32; 3 * plane];
        for (x, y, px) in rgb.enumerate_pixels() {
            let offset = (y * w + x) as usize;
            for c in 0..3 {
                let v = px.0[c] as f32 / 255.0;
                out[c * plane + offset] = (v - MEAN[c]) / STD[c];
            }
        }
        out
    }
}

/// Decode an image file and resize it to `size × size` RGB.
pub fn load_resized(path: &Path, size: u32) -> Result<RgbImage> {
    let img = image::open(path)
        .with_context(|| format!("Cannot decode image '{}'", path.display()))?;
    Ok(img.resize_exact(size, size, FilterType::Triangle).to_rgb8())
}
