//! Face location: detection boxes to croppable face regions, and back.
//!
//! Detector boxes are clamped per axis to the source image, cropped, and
//! optionally resized to a fixed inference resolution. Each region keeps the
//! geometry of its clamped box so generated output can be restored to the
//! exact footprint it replaces.

use crate::detector::DetectorError;
use crate::pipeline::FaceDetect;
use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array3;

/// Default square resolution faces are resized to for model input.
pub const DEFAULT_FACE_SIZE: u32 = 96;

/// A cropped face plus the bookkeeping needed to put it back.
#[derive(Debug, Clone)]
pub struct FaceRegion {
    /// Clamped box in source-image coordinates.
    pub bbox: BoundingBox,
    /// Crop at its original resolution.
    pub image: RgbImage,
    pub original_width: u32,
    pub original_height: u32,
    /// Copy resized for model input, when requested.
    pub resized: Option<RgbImage>,
}

impl FaceRegion {
    /// Crop `bbox` out of `image`, optionally keeping a resized copy.
    pub fn crop(image: &RgbImage, bbox: BoundingBox, resize_to: Option<(u32, u32)>) -> Self {
        let crop =
            imageops::crop_imm(image, bbox.left, bbox.top, bbox.width(), bbox.height()).to_image();
        let resized = resize_to.map(|(w, h)| imageops::resize(&crop, w, h, FilterType::Triangle));

        Self {
            bbox,
            original_width: bbox.width(),
            original_height: bbox.height(),
            image: crop,
            resized,
        }
    }

    /// The image models should consume: the resized copy if present, else the crop.
    pub fn model_input(&self) -> &RgbImage {
        self.resized.as_ref().unwrap_or(&self.image)
    }
}

/// Wraps a detector and turns its raw boxes into [`FaceRegion`]s.
pub struct FaceLocator<D> {
    detector: D,
}

impl<D: FaceDetect> FaceLocator<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }

    /// Locate faces in `image`, in the detector's order.
    ///
    /// Boxes that have no area once clamped are skipped.
    pub fn locate(
        &mut self,
        image: &RgbImage,
        produce_resized: bool,
        resize_to: (u32, u32),
    ) -> Result<Vec<FaceRegion>, DetectorError> {
        let detections = self.detector.detect(image)?;
        let (width, height) = image.dimensions();

        let regions: Vec<FaceRegion> = detections
            .iter()
            .filter_map(|det| {
                let bbox = BoundingBox::clamp(det, width, height);
                if bbox.is_none() {
                    tracing::debug!(
                        left = det.left,
                        top = det.top,
                        right = det.right,
                        bottom = det.bottom,
                        "skipping degenerate face box"
                    );
                }
                bbox
            })
            .map(|bbox| FaceRegion::crop(image, bbox, produce_resized.then_some(resize_to)))
            .collect();

        tracing::debug!(detections = detections.len(), regions = regions.len(), "faces located");
        Ok(regions)
    }
}

/// Restore a generated face (HWC, values in [0, 1]) to `width` x `height` pixels.
pub fn restore(pixels: &Array3<f32>, width: u32, height: u32) -> RgbImage {
    let (h, w, _) = pixels.dim();
    let generated = RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb(std::array::from_fn(|c| to_u8(pixels[[y, x, c]])))
    });

    if generated.dimensions() == (width, height) {
        return generated;
    }
    imageops::resize(&generated, width, height, FilterType::CatmullRom)
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}
