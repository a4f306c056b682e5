//! Makeup removal: image in, de-made-up pixels out.
//!
//! Wraps the [`Generator`] with its input normalization and output
//! denormalization. The returned HWC array is in [0, 1]; scaling to u8 and
//! resizing back to the crop footprint is [`crate::locator::restore`]'s job.

use crate::generator::{Generator, GeneratorConfig, MIN_INPUT_SIDE};
use crate::pipeline::MakeupRemove;
use crate::weights::{WeightError, WeightProvider};
use candle_core::{Device, Module, Tensor};
use candle_nn::VarBuilder;
use image::RgbImage;
use ndarray::Array3;
use thiserror::Error;

const GENERATOR_MEAN: f32 = 0.5;
const GENERATOR_STD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("invalid generator input: {0}")]
    InvalidInput(String),
    #[error("weights: {0}")]
    Weights(#[from] WeightError),
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("output layout: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Runs the trained generator on face crops.
pub struct MakeupRemover {
    generator: Generator,
    device: Device,
}

impl MakeupRemover {
    /// Build the generator from the provider's checkpoint.
    pub fn load(
        provider: &dyn WeightProvider,
        config: &GeneratorConfig,
    ) -> Result<Self, GeneratorError> {
        let vb = provider.generator()?;
        let remover = Self::from_var_builder(config, vb)?;
        tracing::info!(
            filters = config.filters,
            blocks = config.n_blocks,
            "makeup remover ready"
        );
        Ok(remover)
    }

    pub fn from_var_builder(
        config: &GeneratorConfig,
        vb: VarBuilder,
    ) -> Result<Self, GeneratorError> {
        let device = vb.device().clone();
        let generator = Generator::new(config, vb)?;
        Ok(Self { generator, device })
    }

    /// Translate one face. Output is `(height, width, 3)` in [0, 1].
    pub fn remove_makeup(&self, face: &RgbImage) -> Result<Array3<f32>, GeneratorError> {
        let (width, height) = (face.width() as usize, face.height() as usize);
        if width < MIN_INPUT_SIDE || height < MIN_INPUT_SIDE {
            return Err(GeneratorError::InvalidInput(format!(
                "face is {width}x{height}, need at least {MIN_INPUT_SIDE}x{MIN_INPUT_SIDE}"
            )));
        }

        let input = self.to_tensor(face)?;
        let output = self.generator.forward(&input)?;

        // [-1, 1] -> [0, 1], NCHW -> HWC
        let output = output
            .affine(GENERATOR_STD as f64, GENERATOR_MEAN as f64)?
            .squeeze(0)?
            .permute((1, 2, 0))?
            .contiguous()?;
        let (out_h, out_w, channels) = output.dims3()?;
        let data = output.flatten_all()?.to_vec1::<f32>()?;

        tracing::debug!(width, height, out_w, out_h, "generator forward complete");
        Ok(Array3::from_shape_vec((out_h, out_w, channels), data)?)
    }

    /// RGB u8 -> NCHW f32 normalized to [-1, 1], batch 1.
    fn to_tensor(&self, face: &RgbImage) -> Result<Tensor, GeneratorError> {
        let (width, height) = (face.width() as usize, face.height() as usize);
        let data: Vec<f32> = face
            .as_raw()
            .iter()
            .map(|&p| (p as f32 / 255.0 - GENERATOR_MEAN) / GENERATOR_STD)
            .collect();

        let tensor = Tensor::from_vec(data, (1, height, width, 3), &self.device)?
            .permute((0, 3, 1, 2))?
            .contiguous()?;
        Ok(tensor)
    }
}

impl MakeupRemove for MakeupRemover {
    fn remove_makeup(&self, face: &RgbImage) -> Result<Array3<f32>, GeneratorError> {
        MakeupRemover::remove_makeup(self, face)
    }
}
