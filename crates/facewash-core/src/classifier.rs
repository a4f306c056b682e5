//! Two-class makeup classifier.
//!
//! The active architecture can be swapped at runtime. Loaded models are
//! memoized per architecture; a swap replaces the active `Arc` under a write
//! lock, so a `predict` call always runs against one complete model.

use crate::pipeline::MakeupClassify;
use crate::types::Classification;
use crate::weights::{ClassifierArch, WeightError, WeightProvider};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

const CLASSIFIER_INPUT_SIZE: u32 = 96;
const CLASSIFIER_MEAN: f32 = 0.5;
const CLASSIFIER_STD: f32 = 0.5;
const CLASSIFIER_NUM_CLASSES: usize = 2;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model not initialized: select a classifier architecture first")]
    NotInitialized,
    #[error("unknown classifier architecture: {0}")]
    UnknownArchitecture(String),
    #[error("weight not found for {arch}: {reason}")]
    WeightNotFound { arch: String, reason: String },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl ClassifierError {
    /// Errors that no retry on another face could fix.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ClassifierError::NotInitialized
                | ClassifierError::UnknownArchitecture(_)
                | ClassifierError::WeightNotFound { .. }
        )
    }
}

/// Runs a loaded classifier network on a preprocessed NCHW batch.
pub trait ClassifierBackend: Send {
    /// Raw logits for the single image in `input`.
    fn logits(&mut self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError>;
}

/// ONNX Runtime classifier exported with a `[1, 2]` logit output.
pub struct OnnxClassifier {
    session: Session,
}

impl OnnxClassifier {
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded classifier model"
        );

        Ok(Self { session })
    }
}

impl ClassifierBackend for OnnxClassifier {
    fn logits(&mut self, input: &Array4<f32>) -> Result<Vec<f32>, ClassifierError> {
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("logit extraction: {e}")))?;

        Ok(logits.to_vec())
    }
}

/// A loaded model; shared by the cache and by in-flight predictions.
struct LoadedModel {
    arch: ClassifierArch,
    backend: Mutex<Box<dyn ClassifierBackend>>,
}

/// Makeup classifier with a swappable, cached backend.
pub struct MakeupClassifier {
    provider: Arc<dyn WeightProvider>,
    active: RwLock<Option<Arc<LoadedModel>>>,
    cache: Mutex<HashMap<ClassifierArch, Arc<LoadedModel>>>,
}

impl MakeupClassifier {
    /// Create a classifier with no model selected.
    pub fn new(provider: Arc<dyn WeightProvider>) -> Self {
        Self {
            provider,
            active: RwLock::new(None),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Make `arch` the active model, loading it on first use.
    ///
    /// On failure the previously active model stays active.
    pub fn select_model(&self, arch: ClassifierArch) -> Result<(), ClassifierError> {
        let model = self.load_cached(arch)?;
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(model);
        tracing::info!(arch = %arch, "classifier model selected");
        Ok(())
    }

    /// [`select_model`](Self::select_model) by architecture name.
    pub fn select_model_by_name(&self, name: &str) -> Result<(), ClassifierError> {
        let arch: ClassifierArch = name
            .parse()
            .map_err(|_| ClassifierError::UnknownArchitecture(name.to_string()))?;
        self.select_model(arch)
    }

    pub fn active_architecture(&self) -> Option<ClassifierArch> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|m| m.arch)
    }

    /// Drop the cached model for `arch`. The active model is unaffected.
    pub fn invalidate(&self, arch: ClassifierArch) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).remove(&arch);
    }

    /// Drop every cached model. The active model is unaffected.
    pub fn clear_cache(&self) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Classify one face image.
    pub fn predict(&self, face: &RgbImage) -> Result<Classification, ClassifierError> {
        let model = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClassifierError::NotInitialized)?;

        let input = preprocess(face);
        let logits = model
            .backend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .logits(&input)?;

        if logits.len() != CLASSIFIER_NUM_CLASSES {
            return Err(ClassifierError::InferenceFailed(format!(
                "expected {CLASSIFIER_NUM_CLASSES} logits, got {}",
                logits.len()
            )));
        }
        if !logits.iter().all(|l| l.is_finite()) {
            return Err(ClassifierError::InferenceFailed(format!("non-finite logits: {logits:?}")));
        }

        let result = Classification::from_logits([logits[0], logits[1]]);
        tracing::debug!(
            arch = %model.arch,
            class = result.class_index,
            confidence = result.confidence,
            "face classified"
        );
        Ok(result)
    }

    fn load_cached(&self, arch: ClassifierArch) -> Result<Arc<LoadedModel>, ClassifierError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = cache.get(&arch) {
            return Ok(Arc::clone(model));
        }

        let backend = self.provider.classifier(arch).map_err(|e| match e {
            WeightError::UnknownArchitecture(name) => ClassifierError::UnknownArchitecture(name),
            other => ClassifierError::WeightNotFound {
                arch: arch.to_string(),
                reason: other.to_string(),
            },
        })?;

        let model = Arc::new(LoadedModel {
            arch,
            backend: Mutex::new(backend),
        });
        cache.insert(arch, Arc::clone(&model));
        Ok(model)
    }
}

impl MakeupClassify for MakeupClassifier {
    fn predict(&self, face: &RgbImage) -> Result<Classification, ClassifierError> {
        MakeupClassifier::predict(self, face)
    }
}

/// Resize to 96x96, scale to [0, 1], normalize to [-1, 1], NCHW with batch 1.
fn preprocess(face: &RgbImage) -> Array4<f32> {
    let size = CLASSIFIER_INPUT_SIZE;
    let resized = imageops::resize(face, size, size, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (v - CLASSIFIER_MEAN) / CLASSIFIER_STD;
        }
    }

    tensor
}
