use serde::{Deserialize, Serialize};

/// Class index the classifier was trained to emit for made-up faces.
pub const MAKEUP_CLASS: usize = 1;

/// Class index for faces without makeup.
pub const NO_MAKEUP_CLASS: usize = 0;

/// Raw face detection in source-image pixel space.
///
/// Coordinates come straight from the detector and may fall outside the
/// image; [`BoundingBox::clamp`] turns them into a croppable box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl Detection {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Face box clamped to the image it was detected on.
///
/// Holds `left < right <= width` and `top < bottom <= height` for that image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    /// Clamp a raw detection to a `width` x `height` image, each axis
    /// against its own bound. Returns `None` when the clamped box has no area.
    pub fn clamp(detection: &Detection, width: u32, height: u32) -> Option<Self> {
        let clamp_axis = |v: f32, max: u32| -> u32 {
            if !v.is_finite() {
                return 0;
            }
            v.round().clamp(0.0, max as f32) as u32
        };

        let left = clamp_axis(detection.left, width);
        let right = clamp_axis(detection.right, width);
        let top = clamp_axis(detection.top, height);
        let bottom = clamp_axis(detection.bottom, height);

        if left >= right || top >= bottom {
            return None;
        }

        Some(Self { left, top, right, bottom })
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Output of the makeup classifier for one face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Predicted class: 0 = no makeup, 1 = makeup.
    pub class_index: usize,
    /// Softmax probability of `class_index`, in [0, 1].
    pub confidence: f32,
    /// Softmax probabilities for [no makeup, makeup].
    pub probabilities: [f32; 2],
}

impl Classification {
    /// Build a classification from the two raw logits.
    pub fn from_logits(logits: [f32; 2]) -> Self {
        let probabilities = softmax(logits);
        // Ties resolve to the lower index, like argmax.
        let class_index = if probabilities[MAKEUP_CLASS] > probabilities[NO_MAKEUP_CLASS] {
            MAKEUP_CLASS
        } else {
            NO_MAKEUP_CLASS
        };

        Self {
            class_index,
            confidence: probabilities[class_index],
            probabilities,
        }
    }

    pub fn is_makeup(&self) -> bool {
        self.class_index == MAKEUP_CLASS
    }
}

/// Numerically stable softmax over two logits.
fn softmax(logits: [f32; 2]) -> [f32; 2] {
    let max = logits[0].max(logits[1]);
    let e0 = (logits[0] - max).exp();
    let e1 = (logits[1] - max).exp();
    let sum = e0 + e1;
    [e0 / sum, e1 / sum]
}
