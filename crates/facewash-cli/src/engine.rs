use crate::config::Config;
use facewash_core::{
    ClassifierArch, ClassifierError, DetectorError, FaceDetector, GeneratorError, MakeupClassifier,
    MakeupRemover, PerFaceResult, Pipeline, PipelineError,
};
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

type FacePipeline = Pipeline<FaceDetector, MakeupClassifier, MakeupRemover>;

/// Messages sent from the CLI to the engine thread.
enum EngineRequest {
    Process {
        image: RgbImage,
        reply: oneshot::Sender<Result<Vec<PerFaceResult>, EngineError>>,
    },
    SelectModel {
        arch: ClassifierArch,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run the full pipeline on one decoded image.
    pub async fn process(&self, image: RgbImage) -> Result<Vec<PerFaceResult>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Process { image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Swap the active classifier. Queued behind any pending images.
    pub async fn select_model(&self, arch: ClassifierArch) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::SelectModel { arch, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads the detector, the configured classifier and the generator up front
/// and fails fast if any of them is missing.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let models = config.models();

    let detector = FaceDetector::load(&models.detector_path())?;

    let classifier = MakeupClassifier::new(Arc::new(models.clone()));
    classifier.select_model(config.classifier)?;

    let remover = MakeupRemover::load(&models, &config.generator())?;

    tracing::info!(
        model_dir = %models.root().display(),
        classifier = %config.classifier,
        "models loaded"
    );

    let mut pipeline: FacePipeline =
        Pipeline::new(detector, classifier, remover, config.pipeline());

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facewash-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Process { image, reply } => {
                        let result = pipeline.process(&image).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::SelectModel { arch, reply } => {
                        let result = pipeline
                            .classifier()
                            .select_model(arch)
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}
