//! facewash-core: face location, makeup classification and makeup removal.
//!
//! Faces are found with SCRFD and classified with a two-class CNN, both via
//! ONNX Runtime. Made-up faces are translated by a CycleGAN generator built
//! with candle.

pub mod classifier;
pub mod detector;
pub mod generator;
pub mod locator;
pub mod pipeline;
pub mod remover;
pub mod types;
pub mod weights;

pub use classifier::{ClassifierBackend, ClassifierError, MakeupClassifier};
pub use detector::{DetectorError, FaceDetector};
pub use generator::{Activation, Generator, GeneratorConfig};
pub use locator::{restore, FaceLocator, FaceRegion};
pub use pipeline::{
    FaceDetect, FaceOutcome, FaceSummary, MakeupClassify, MakeupRemove, PerFaceResult, Pipeline,
    PipelineConfig, PipelineError,
};
pub use remover::{GeneratorError, MakeupRemover};
pub use types::{BoundingBox, Classification, Detection};
pub use weights::{default_model_dir, ClassifierArch, ModelDir, WeightError, WeightProvider};
