//! Model weight lookup.
//!
//! A [`WeightProvider`] hands out ready-to-run models by architecture name.
//! [`ModelDir`] is the on-disk implementation: one ONNX file per classifier
//! architecture plus the generator checkpoint as safetensors.

use crate::classifier::{ClassifierBackend, OnnxClassifier};
use crate::detector::SCRFD_MODEL_FILE;
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// File name of the generator checkpoint inside a model directory.
pub const GENERATOR_WEIGHTS_FILE: &str = "generator.safetensors";

#[derive(Error, Debug)]
pub enum WeightError {
    #[error("weight not found: {0}")]
    NotFound(String),
    #[error("unknown classifier architecture: {0}")]
    UnknownArchitecture(String),
    #[error("failed to load weights from {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Classifier architectures with trained two-class weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierArch {
    #[default]
    Resnet34,
    MobileNetV3Large,
}

impl ClassifierArch {
    pub const ALL: [ClassifierArch; 2] =
        [ClassifierArch::Resnet34, ClassifierArch::MobileNetV3Large];

    pub fn name(&self) -> &'static str {
        match self {
            ClassifierArch::Resnet34 => "resnet34",
            ClassifierArch::MobileNetV3Large => "mobile_net_v3_large",
        }
    }

    /// ONNX file holding this architecture's weights.
    pub fn model_file(&self) -> String {
        format!("{}.onnx", self.name())
    }
}

impl fmt::Display for ClassifierArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClassifierArch {
    type Err = WeightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resnet34" => Ok(ClassifierArch::Resnet34),
            "mobile_net_v3_large" | "mobilenet_v3_large" => Ok(ClassifierArch::MobileNetV3Large),
            _ => Err(WeightError::UnknownArchitecture(s.to_string())),
        }
    }
}

/// Source of initialized model parameters.
pub trait WeightProvider: Send + Sync {
    /// Load the classifier for `arch`, ready for inference.
    fn classifier(&self, arch: ClassifierArch) -> Result<Box<dyn ClassifierBackend>, WeightError>;

    /// Load the generator parameters, keyed by PyTorch state-dict names.
    fn generator(&self) -> Result<VarBuilder<'static>, WeightError>;
}

/// Default model directory: `$XDG_DATA_HOME/facewash/models`, else
/// `$HOME/.local/share/facewash/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facewash/models")
}

/// Weight provider backed by a directory of model files.
#[derive(Debug, Clone)]
pub struct ModelDir {
    root: PathBuf,
}

impl ModelDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn detector_path(&self) -> PathBuf {
        self.root.join(SCRFD_MODEL_FILE)
    }

    pub fn classifier_path(&self, arch: ClassifierArch) -> PathBuf {
        self.root.join(arch.model_file())
    }

    pub fn generator_path(&self) -> PathBuf {
        self.root.join(GENERATOR_WEIGHTS_FILE)
    }

    /// Whether weights for `arch` are present on disk.
    pub fn has_classifier(&self, arch: ClassifierArch) -> bool {
        self.classifier_path(arch).is_file()
    }

    fn existing(path: PathBuf) -> Result<PathBuf, WeightError> {
        if path.is_file() {
            Ok(path)
        } else {
            Err(WeightError::NotFound(path.display().to_string()))
        }
    }
}

impl WeightProvider for ModelDir {
    fn classifier(&self, arch: ClassifierArch) -> Result<Box<dyn ClassifierBackend>, WeightError> {
        let path = Self::existing(self.classifier_path(arch))?;
        let backend = OnnxClassifier::load(&path).map_err(|e| WeightError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(backend))
    }

    fn generator(&self) -> Result<VarBuilder<'static>, WeightError> {
        let path = Self::existing(self.generator_path())?;
        let device = Device::Cpu;
        let tensors = candle_core::safetensors::load(&path, &device)?;

        tracing::info!(
            path = %path.display(),
            tensors = tensors.len(),
            "loaded generator weights"
        );

        Ok(VarBuilder::from_tensors(tensors, DType::F32, &device))
    }
}
