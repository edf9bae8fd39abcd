// ============================================================
// Layer 5 — Vision Transformer Classifier
// ============================================================
//   images [B, C, H, W]
//     → patch embedding (Conv2d, kernel = stride = patch)   [B, N, D]
//     → prepend class token, add position embedding         [B, N+1, D]
//     → L pre-norm encoder blocks                           [B, N+1, D]
//     → LayerNorm, take class token, linear head            [B, K]
//
// The forward pass is split into embed / forward_blocks /
// classify so Grad-CAM can cut the graph at any block.

use anyhow::{ensure, Result};
use burn::{
    module::Param,
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        conv::{Conv2d, Conv2dConfig},
        Dropout, DropoutConfig,
        Initializer,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};
use std::ops::Range;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct VitConfig {
    pub num_classes: usize,
    #[config(default = 224)]
    pub image_size:  usize,
    #[config(default = 16)]
    pub patch_size:  usize,
    #[config(default = 3)]
    pub channels:    usize,
    #[config(default = 192)]
    pub d_model:     usize,
    #[config(default = 3)]
    pub num_heads:   usize,
    #[config(default = 6)]
    pub num_layers:  usize,
    #[config(default = 768)]
    pub d_ff:        usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl VitConfig {
    /// Reject shape combinations the architecture cannot build.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.num_classes > 0, "num_classes must be positive");
        ensure!(self.patch_size > 0, "patch_size must be positive");
        ensure!(
            self.image_size % self.patch_size == 0,
            "image_size {} is not divisible by patch_size {}",
            self.image_size,
            self.patch_size
        );
        ensure!(
            self.num_heads > 0 && self.d_model % self.num_heads == 0,
            "d_model {} is not divisible by num_heads {}",
            self.d_model,
            self.num_heads
        );
        ensure!(self.num_layers > 0, "num_layers must be positive");
        Ok(())
    }

    /// Patches per side of the square patch grid.
    pub fn grid_size(&self) -> usize {
        self.image_size / self.patch_size
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> VitClassifier<B> {
        let p = self.patch_size;
        let n = self.grid_size() * self.grid_size();

        let patch_embed = Conv2dConfig::new([self.channels, self.d_model], [p, p])
            .with_stride([p, p])
            .init(device);
        let token_init    = Initializer::Normal { mean: 0.0, std: 0.02 };
        let cls_token     = token_init.init([1, 1, self.d_model], device);
        let pos_embedding = token_init.init([1, n + 1, self.d_model], device);

        let layers = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();

        VitClassifier {
            patch_embed,
            cls_token,
            pos_embedding,
            layers,
            final_norm: LayerNormConfig::new(self.d_model).init(device),
            head:       LinearConfig::new(self.d_model, self.num_classes).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// Pre-norm block: x + Attn(LN(x)), then x + FFN(LN(x)).
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let attn_in  = self.norm1.forward(x.clone());
        let attn_out = self.self_attn.forward(MhaInput::self_attn(attn_in)).context;
        let x = x + self.dropout.forward(attn_out);

        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(self.norm2.forward(x.clone())))
        );
        x + self.dropout.forward(ffn_out)
    }
}

#[derive(Module, Debug)]
pub struct VitClassifier<B: Backend> {
    pub patch_embed:   Conv2d<B>,
    pub cls_token:     Param<Tensor<B, 3>>,
    pub pos_embedding: Param<Tensor<B, 3>>,
    pub layers:        Vec<EncoderBlock<B>>,
    pub final_norm:    LayerNorm<B>,
    pub head:          Linear<B>,
    pub dropout:       Dropout,
}

impl<B: Backend> VitClassifier<B> {
    /// images: [batch, channels, size, size] → logits: [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let tokens = self.embed(images);
        let tokens = self.forward_blocks(tokens, 0..self.layers.len());
        self.classify(tokens)
    }

    /// Patch + class token + position embedding → [batch, N+1, D]
    pub fn embed(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let patches = self.patch_embed.forward(images); // [B, D, gh, gw]
        let [batch, d_model, gh, gw] = patches.dims();
        let tokens = gh * gw;

        let patches = patches
            .reshape([batch, d_model, tokens])
            .swap_dims(1, 2);
        let cls = self.cls_token.val().expand([batch, 1, d_model]);
        let x   = Tensor::cat(vec![cls, patches], 1);
        let pos = self.pos_embedding.val().expand([batch, tokens + 1, d_model]);

        self.dropout.forward(x + pos)
    }

    /// Run the encoder blocks in `range` over a token sequence.
    pub fn forward_blocks(&self, mut x: Tensor<B, 3>, range: Range<usize>) -> Tensor<B, 3> {
        for layer in &self.layers[range] {
            x = layer.forward(x);
        }
        x
    }

    /// Final norm on the class token followed by the linear head.
    pub fn classify(&self, tokens: Tensor<B, 3>) -> Tensor<B, 2> {
        let x = self.final_norm.forward(tokens);
        let [batch, _, d_model] = x.dims();
        let cls = x.slice([0..batch, 0..1, 0..d_model]).reshape([batch, d_model]);
        self.head.forward(cls)
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Named shapes of every tensor whose size depends on the config.
    /// Two models built from the same config always agree.
    pub fn parameter_shapes(&self) -> Vec<(String, Vec<usize>)> {
        self.clone().into_record().parameter_shapes()
    }
}

impl<B: Backend> VitClassifierRecord<B> {
    /// Same manifest as `VitClassifier::parameter_shapes`, read from a
    /// record before it is loaded into a model.
    pub fn parameter_shapes(&self) -> Vec<(String, Vec<usize>)> {
        let mut shapes = vec![
            ("patch_embed.weight".to_string(), self.patch_embed.weight.val().dims().to_vec()),
            ("cls_token".to_string(),          self.cls_token.val().dims().to_vec()),
            ("pos_embedding".to_string(),      self.pos_embedding.val().dims().to_vec()),
        ];
        for (i, layer) in self.layers.iter().enumerate() {
            shapes.push((format!("layers.{i}.ffn_linear1.weight"), layer.ffn_linear1.weight.val().dims().to_vec()));
            shapes.push((format!("layers.{i}.ffn_linear2.weight"), layer.ffn_linear2.weight.val().dims().to_vec()));
        }
        shapes.push(("head.weight".to_string(), self.head.weight.val().dims().to_vec()));
        shapes
    }
}

/// 8×8 images, 2×2 patch grid, two blocks. Small enough for CPU tests.
#[cfg(test)]
pub(crate) fn tiny_config(num_classes: usize) -> VitConfig {
    VitConfig::new(num_classes)
        .with_image_size(8)
        .with_patch_size(4)
        .with_d_model(8)
        .with_num_heads(2)
        .with_num_layers(2)
        .with_d_ff(16)
        .with_dropout(0.0)
}
