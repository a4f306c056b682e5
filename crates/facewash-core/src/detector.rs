//! SCRFD face detector via ONNX Runtime.
//!
//! Runs the SCRFD detector on RGB photographs with 3-stride anchor-free
//! decoding and NMS post-processing. Boxes are returned in source-image
//! pixel space and are not clamped; that is the locator's job.

use crate::pipeline::FaceDetect;
use crate::types::Detection;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// File name of the detector model inside a model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy)]
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl LetterboxInfo {
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    /// Per-stride output indices [(score, bbox, kps)] for strides [8, 16, 32].
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self { session, stride_indices })
    }

    /// Detect faces in an RGB image, sorted by confidence.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = letterbox(image, SCRFD_INPUT_SIZE);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();

        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
                })?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
                })?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            all_detections.extend(decode_stride(
                scores,
                bboxes,
                kps,
                stride,
                SCRFD_INPUT_SIZE,
                &letterbox,
                SCRFD_CONFIDENCE_THRESHOLD,
            ));
        }

        let result = nms(all_detections, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = result.len(), "SCRFD detection complete");

        Ok(result)
    }
}

impl FaceDetect for FaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        FaceDetector::detect(self, image)
    }
}

/// Letterbox an RGB image into a square NCHW tensor normalized to the SCRFD
/// input distribution. Padding uses the mean so it normalizes to 0.0.
fn letterbox(image: &RgbImage, size: usize) -> (Array4<f32>, LetterboxInfo) {
    let (width, height) = (image.width() as f32, image.height() as f32);
    let scale = (size as f32 / width).min(size as f32 / height);

    let new_w = ((width * scale).round() as usize).clamp(1, size);
    let new_h = ((height * scale).round() as usize).clamp(1, size);
    let pad_x = (size - new_w) as f32 / 2.0;
    let pad_y = (size - new_h) as f32 / 2.0;

    let resized = imageops::resize(image, new_w as u32, new_h as u32, FilterType::Triangle);

    let pad_x_start = pad_x.floor() as usize;
    let pad_y_start = pad_y.floor() as usize;

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + pad_x_start, y as usize + pad_y_start);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
        }
    }
    // Pixels outside the resized area stay 0.0, i.e. a mean-valued border.

    (tensor, LetterboxInfo { scale, pad_x, pad_y })
}

/// Discover output tensor ordering by name.
///
/// SCRFD exports name their outputs either `score_8`, `bbox_16`, `kps_32`, ...
/// or with bare numbers. Unrecognized names fall back to the positional layout
/// [0-2] = scores, [3-5] = bboxes, [6-8] = kps.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named {
        Some(indices) => {
            tracing::debug!("SCRFD: using name-based output tensor mapping");
            [indices[0], indices[1], indices[2]]
        }
        None => {
            tracing::debug!(?names, "SCRFD: output names not recognized, using positional mapping");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Decode detections for a single stride level.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<Detection> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid) as f32 * step;
        let anchor_cy = (anchor_idx / grid) as f32 * step;

        // [left, top, right, bottom] distances from the anchor, in stride units
        let Some(dist) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };
        let (left, top) = letterbox.unmap(anchor_cx - dist[0] * step, anchor_cy - dist[1] * step);
        let (right, bottom) =
            letterbox.unmap(anchor_cx + dist[2] * step, anchor_cy + dist[3] * step);

        let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|k| {
            std::array::from_fn(|i| {
                letterbox.unmap(anchor_cx + k[i * 2] * step, anchor_cy + k[i * 2 + 1] * step)
            })
        });

        detections.push(Detection {
            left,
            top,
            right,
            bottom,
            confidence: score,
            landmarks,
        });
    }

    detections
}

/// Non-Maximum Suppression. Output is sorted by confidence, highest first.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }

    keep
}

/// Intersection-over-Union between two detections.
fn iou(a: &Detection, b: &Detection) -> f32 {
    let inter_w = (a.right.min(b.right) - a.left.max(b.left)).max(0.0);
    let inter_h = (a.bottom.min(b.bottom) - a.top.max(b.top)).max(0.0);
    let inter_area = inter_w * inter_h;

    let union_area = a.width() * a.height() + b.width() * b.height() - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn make_det(x: f32, y: f32, w: f32, h: f32, conf: f32) -> Detection {
        Detection {
            left: x,
            top: y,
            right: x + w,
            bottom: y + h,
            confidence: conf,
            landmarks: None,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_det(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_det(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_det(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_det(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_det(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap 5x10 = 50, union 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_det(5.0, 5.0, 100.0, 100.0, 0.8),
            make_det(0.0, 0.0, 100.0, 100.0, 0.9),
            make_det(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_shape_and_padding() {
        let image = RgbImage::from_pixel(320, 160, Rgb([255, 255, 255]));
        let (tensor, info) = letterbox(&image, 640);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!((info.scale - 2.0).abs() < 1e-6);
        assert!((info.pad_x - 0.0).abs() < 1e-6);
        assert!((info.pad_y - 160.0).abs() < 1e-6);

        // Top border is padding, centre is image content.
        assert_eq!(tensor[[0, 0, 0, 320]], 0.0);
        let expected = (255.0 - SCRFD_MEAN) / SCRFD_STD;
        assert!((tensor[[0, 2, 320, 320]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_coordinate_roundtrip() {
        let image = RgbImage::new(320, 240);
        let (_, info) = letterbox(&image, 640);

        let (orig_x, orig_y) = (100.0f32, 50.0f32);
        let boxed = (orig_x * info.scale + info.pad_x, orig_y * info.scale + info.pad_y);
        let (rx, ry) = info.unmap(boxed.0, boxed.1);

        assert!((rx - orig_x).abs() < 0.1, "x: {rx} vs {orig_x}");
        assert!((ry - orig_y).abs() < 0.1, "y: {ry} vs {orig_y}");
    }

    #[test]
    fn test_decode_stride_maps_to_source_space() {
        // Stride 32 on a 640 input: 20x20 grid, 2 anchors per cell.
        let grid = 640 / 32;
        let n = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; n];
        let mut bboxes = vec![0.0f32; n * 4];
        let kps = vec![0.0f32; n * 10];

        // Anchor cell (x=5, y=4) -> centre (160, 128), first anchor.
        let idx = (4 * grid + 5) * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.9;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let info = LetterboxInfo { scale: 2.0, pad_x: 0.0, pad_y: 80.0 };
        let dets = decode_stride(&scores, &bboxes, &kps, 32, 640, &info, 0.5);

        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert!((d.left - 64.0).abs() < 1e-4);
        assert!((d.right - 96.0).abs() < 1e-4);
        assert!((d.top - 8.0).abs() < 1e-4);
        assert!((d.bottom - 40.0).abs() < 1e-4);
        assert!(d.landmarks.is_some());
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = [
            "score_8", "score_16", "score_32",
            "bbox_8",  "bbox_16",  "bbox_32",
            "kps_8",   "kps_16",   "kps_32",
        ].iter().map(|s| s.to_string()).collect();

        assert_eq!(discover_output_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_discover_output_indices_shuffled_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ].iter().map(|s| s.to_string()).collect();

        assert_eq!(discover_output_indices(&names), [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceDetector::load(Path::new("/nonexistent/det_10g.onnx")).err().unwrap();
        assert!(matches!(err, DetectorError::ModelNotFound(_)));
    }
}
