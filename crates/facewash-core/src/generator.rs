//! CycleGAN-style translation network: downscale, residual stage, upscale.
//!
//! Channel counts are fixed at construction; nothing is inferred from the
//! first input. Parameters are looked up under the PyTorch state-dict names of
//! the trained network (`down_scale.1.block.0.weight`, `up_scale.3.bias`, ...),
//! so an exported checkpoint loads without renaming.

use candle_core::{bail, Module, Result, Tensor};
use candle_nn::{
    batch_norm, conv2d, conv_transpose2d, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig,
    ConvTranspose2d, ConvTranspose2dConfig, VarBuilder,
};

/// Net spatial downsampling of the encoder.
pub const DOWNSCALE_FACTOR: usize = 4;

/// Smallest input side the residual stage can reflect-pad.
pub const MIN_INPUT_SIDE: usize = 13;

/// Slope PyTorch's `LeakyReLU` uses by default.
pub const LEAKY_RELU_SLOPE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    Relu,
    LeakyRelu(f64),
}

impl Activation {
    fn apply(&self, x: &Tensor) -> Result<Tensor> {
        match self {
            Activation::Relu => x.relu(),
            Activation::LeakyRelu(slope) => candle_nn::ops::leaky_relu(x, *slope),
        }
    }
}

/// Shape of the generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub input_channels: usize,
    pub output_channels: usize,
    /// Base filter count F; the residual stage runs at 4F.
    pub filters: usize,
    /// Number of residual blocks.
    pub n_blocks: usize,
    /// Activation of the three encoder conv blocks.
    pub encoder_activation: Activation,
    /// Activation of the residual and decoder blocks.
    pub activation: Activation,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            input_channels: 3,
            output_channels: 3,
            filters: 64,
            n_blocks: 9,
            encoder_activation: Activation::LeakyRelu(LEAKY_RELU_SLOPE),
            activation: Activation::LeakyRelu(LEAKY_RELU_SLOPE),
        }
    }
}

/// Mirror-pad the two spatial dimensions of an NCHW tensor by `pad`,
/// without repeating the edge sample.
pub fn reflection_pad2d(x: &Tensor, pad: usize) -> Result<Tensor> {
    let x = reflect_dim(x, 2, pad)?;
    reflect_dim(&x, 3, pad)
}

fn reflect_dim(x: &Tensor, dim: usize, pad: usize) -> Result<Tensor> {
    if pad == 0 {
        return Ok(x.clone());
    }
    let n = x.dim(dim)?;
    if pad >= n {
        bail!("reflection pad {pad} requires dimension {dim} larger than {n}");
    }

    let indices: Vec<u32> = (1..=pad)
        .rev()
        .chain(0..n)
        .chain((n - 1 - pad..n - 1).rev())
        .map(|i| i as u32)
        .collect();
    let len = indices.len();
    let indices = Tensor::from_vec(indices, len, x.device())?;
    x.index_select(&indices, dim)
}

/// Convolution + batch norm + activation.
struct ConvBlock {
    conv: Conv2d,
    norm: BatchNorm,
    activation: Activation,
}

impl ConvBlock {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        activation: Activation,
        vb: VarBuilder,
    ) -> Result<Self> {
        let vb = vb.pp("block");
        let conv = conv2d(
            in_channels,
            out_channels,
            kernel_size,
            Conv2dConfig {
                stride,
                padding,
                ..Default::default()
            },
            vb.pp("0"),
        )?;
        let norm = batch_norm(out_channels, BatchNormConfig::default(), vb.pp("1"))?;
        Ok(Self { conv, norm, activation })
    }
}

impl Module for ConvBlock {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.conv.forward(x)?.apply_t(&self.norm, false)?;
        self.activation.apply(&h)
    }
}

/// Transposed convolution (k3 s2 p1, output padding 1) + batch norm + activation.
/// Doubles the spatial size.
struct DeconvBlock {
    deconv: ConvTranspose2d,
    norm: BatchNorm,
    activation: Activation,
}

impl DeconvBlock {
    fn new(
        in_channels: usize,
        out_channels: usize,
        activation: Activation,
        vb: VarBuilder,
    ) -> Result<Self> {
        let vb = vb.pp("block");
        let deconv = conv_transpose2d(
            in_channels,
            out_channels,
            3,
            ConvTranspose2dConfig {
                stride: 2,
                padding: 1,
                output_padding: 1,
                ..Default::default()
            },
            vb.pp("0"),
        )?;
        let norm = batch_norm(out_channels, BatchNormConfig::default(), vb.pp("1"))?;
        Ok(Self { deconv, norm, activation })
    }
}

impl Module for DeconvBlock {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.deconv.forward(x)?.apply_t(&self.norm, false)?;
        self.activation.apply(&h)
    }
}

/// Two unpadded 3x3 convolutions, each followed by a 1-pixel reflection pad
/// that restores the size the convolution took, plus an identity skip.
pub struct ResidualBlock {
    conv1: Conv2d,
    norm1: BatchNorm,
    conv2: Conv2d,
    norm2: BatchNorm,
    activation: Activation,
}

impl ResidualBlock {
    pub fn new(channels: usize, activation: Activation, vb: VarBuilder) -> Result<Self> {
        let vb = vb.pp("block");
        // Sequential indices 1 and 5 are the parameterless reflection pads.
        Ok(Self {
            conv1: conv2d(channels, channels, 3, Conv2dConfig::default(), vb.pp("0"))?,
            norm1: batch_norm(channels, BatchNormConfig::default(), vb.pp("2"))?,
            conv2: conv2d(channels, channels, 3, Conv2dConfig::default(), vb.pp("4"))?,
            norm2: batch_norm(channels, BatchNormConfig::default(), vb.pp("6"))?,
            activation,
        })
    }
}

impl Module for ResidualBlock {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.conv1.forward(x)?;
        let h = reflection_pad2d(&h, 1)?.apply_t(&self.norm1, false)?;
        let h = self.activation.apply(&h)?;
        let h = self.conv2.forward(&h)?;
        let h = reflection_pad2d(&h, 1)?.apply_t(&self.norm2, false)?;
        h + x
    }
}

/// The makeup-removal generator.
pub struct Generator {
    down: [ConvBlock; 3],
    residuals: Vec<ResidualBlock>,
    up: [DeconvBlock; 2],
    output: Conv2d,
}

impl Generator {
    pub fn new(config: &GeneratorConfig, vb: VarBuilder) -> Result<Self> {
        let f = config.filters;
        let enc = config.encoder_activation;
        let act = config.activation;

        // down_scale.0 is the leading reflection pad.
        let down_vb = vb.pp("down_scale");
        let down = [
            ConvBlock::new(config.input_channels, f, 7, 1, 0, enc, down_vb.pp("1"))?,
            ConvBlock::new(f, f * 2, 3, 2, 1, enc, down_vb.pp("2"))?,
            ConvBlock::new(f * 2, f * 4, 3, 2, 1, enc, down_vb.pp("3"))?,
        ];

        let residuals = (0..config.n_blocks)
            .map(|i| ResidualBlock::new(f * 4, act, down_vb.pp(4 + i)))
            .collect::<Result<Vec<_>>>()?;

        // up_scale.2 is the reflection pad, up_scale.4 the tanh.
        let up_vb = vb.pp("up_scale");
        let up = [
            DeconvBlock::new(f * 4, f * 2, act, up_vb.pp("0"))?,
            DeconvBlock::new(f * 2, f, act, up_vb.pp("1"))?,
        ];
        let output = conv2d(f, config.output_channels, 7, Conv2dConfig::default(), up_vb.pp("3"))?;

        tracing::debug!(
            filters = f,
            blocks = config.n_blocks,
            "generator constructed"
        );

        Ok(Self { down, residuals, up, output })
    }
}

impl Module for Generator {
    /// NCHW in [-1, 1] to NCHW in [-1, 1]. Spatial size is preserved when
    /// height and width are multiples of [`DOWNSCALE_FACTOR`].
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut h = reflection_pad2d(x, 3)?;
        for block in &self.down {
            h = block.forward(&h)?;
        }
        for block in &self.residuals {
            h = block.forward(&h)?;
        }
        for block in &self.up {
            h = block.forward(&h)?;
        }
        let h = reflection_pad2d(&h, 3)?;
        self.output.forward(&h)?.tanh()
    }
}
