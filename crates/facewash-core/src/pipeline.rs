//! Per-image orchestration: locate, classify, transform or pass through.
//!
//! Each face is handled on its own. A classifier or generator failure on one
//! face is reported in that face's result and the rest of the image carries
//! on; missing model configuration aborts the whole call.

use crate::classifier::ClassifierError;
use crate::detector::DetectorError;
use crate::locator::{restore, FaceLocator, FaceRegion, DEFAULT_FACE_SIZE};
use crate::remover::GeneratorError;
use crate::types::{BoundingBox, Classification, Detection};
use image::RgbImage;
use ndarray::Array3;
use serde::Serialize;
use thiserror::Error;

/// Produces raw face boxes for an image.
pub trait FaceDetect {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError>;
}

/// Classifies a face as made-up or not.
pub trait MakeupClassify {
    fn predict(&self, face: &RgbImage) -> Result<Classification, ClassifierError>;
}

/// Produces a de-made-up face as HWC pixels in [0, 1].
pub trait MakeupRemove {
    fn remove_makeup(&self, face: &RgbImage) -> Result<Array3<f32>, GeneratorError>;
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("face detection failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("configuration error: {0}")]
    Configuration(ClassifierError),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Feed models a fixed-size copy of each face instead of the raw crop.
    pub resize_faces: bool,
    /// Side of the square faces are resized to.
    pub face_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resize_faces: true,
            face_size: DEFAULT_FACE_SIZE,
        }
    }
}

/// What happened to one face.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FaceOutcome {
    /// Makeup detected; output is the generated face.
    Transformed,
    /// No makeup detected; output is the original crop.
    Passthrough,
    /// Classification or generation failed; output is the original crop.
    Failed { reason: String },
}

/// Result for one detected face, ready for display.
#[derive(Debug, Clone)]
pub struct PerFaceResult {
    pub index: usize,
    pub bbox: BoundingBox,
    /// The face as cropped from the input, at original resolution.
    pub original: RgbImage,
    pub classification: Option<Classification>,
    /// Image to show in place of the original.
    pub output: RgbImage,
    pub outcome: FaceOutcome,
}

impl PerFaceResult {
    pub fn caption(&self) -> String {
        match &self.outcome {
            FaceOutcome::Transformed => "makeup detected".to_string(),
            FaceOutcome::Passthrough => "No makeup detected.".to_string(),
            FaceOutcome::Failed { reason } => format!("processing failed: {reason}"),
        }
    }

    pub fn summary(&self) -> FaceSummary {
        FaceSummary {
            index: self.index,
            bbox: self.bbox,
            width: self.original.width(),
            height: self.original.height(),
            class_index: self.classification.map(|c| c.class_index),
            confidence: self.classification.map(|c| c.confidence),
            outcome: self.outcome.clone(),
            caption: self.caption(),
        }
    }
}

/// Serializable digest of a [`PerFaceResult`].
#[derive(Debug, Clone, Serialize)]
pub struct FaceSummary {
    pub index: usize,
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
    pub class_index: Option<usize>,
    pub confidence: Option<f32>,
    pub outcome: FaceOutcome,
    pub caption: String,
}

/// Locate -> classify -> transform-or-pass-through, per uploaded image.
pub struct Pipeline<D, C, R> {
    locator: FaceLocator<D>,
    classifier: C,
    remover: R,
    config: PipelineConfig,
}

impl<D, C, R> Pipeline<D, C, R>
where
    D: FaceDetect,
    C: MakeupClassify,
    R: MakeupRemove,
{
    pub fn new(detector: D, classifier: C, remover: R, config: PipelineConfig) -> Self {
        Self {
            locator: FaceLocator::new(detector),
            classifier,
            remover,
            config,
        }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Process one image. No faces is an empty result, not an error.
    pub fn process(&mut self, image: &RgbImage) -> Result<Vec<PerFaceResult>, PipelineError> {
        let size = self.config.face_size;
        let regions = self
            .locator
            .locate(image, self.config.resize_faces, (size, size))?;

        tracing::info!(
            width = image.width(),
            height = image.height(),
            faces = regions.len(),
            "faces located"
        );

        let mut results = Vec::with_capacity(regions.len());
        for (index, region) in regions.into_iter().enumerate() {
            results.push(self.process_face(index, region)?);
        }
        Ok(results)
    }

    fn process_face(
        &self,
        index: usize,
        region: FaceRegion,
    ) -> Result<PerFaceResult, PipelineError> {
        let classification = match self.classifier.predict(region.model_input()) {
            Ok(c) => c,
            Err(e) if e.is_configuration() => return Err(PipelineError::Configuration(e)),
            Err(e) => {
                tracing::warn!(face = index, error = %e, "classification failed");
                return Ok(failed(index, region, None, e.to_string()));
            }
        };

        if !classification.is_makeup() {
            tracing::debug!(
                face = index,
                confidence = classification.confidence,
                "no makeup, passing through"
            );
            return Ok(PerFaceResult {
                index,
                bbox: region.bbox,
                output: region.image.clone(),
                original: region.image,
                classification: Some(classification),
                outcome: FaceOutcome::Passthrough,
            });
        }

        match self.remover.remove_makeup(region.model_input()) {
            Ok(pixels) => {
                let output = restore(&pixels, region.original_width, region.original_height);
                tracing::debug!(
                    face = index,
                    confidence = classification.confidence,
                    "makeup removed"
                );
                Ok(PerFaceResult {
                    index,
                    bbox: region.bbox,
                    original: region.image,
                    classification: Some(classification),
                    output,
                    outcome: FaceOutcome::Transformed,
                })
            }
            Err(e) => {
                tracing::warn!(face = index, error = %e, "makeup removal failed");
                Ok(failed(index, region, Some(classification), e.to_string()))
            }
        }
    }
}

fn failed(
    index: usize,
    region: FaceRegion,
    classification: Option<Classification>,
    reason: String,
) -> PerFaceResult {
    PerFaceResult {
        index,
        bbox: region.bbox,
        output: region.image.clone(),
        original: region.image,
        classification,
        outcome: FaceOutcome::Failed { reason },
    }
}
