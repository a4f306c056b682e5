use facewash_core::{
    BoundingBox, Classification, ClassifierError, Detection, DetectorError, FaceDetect, FaceOutcome,
    GeneratorError, MakeupClassify, MakeupRemove, Pipeline, PipelineConfig, PipelineError,
};
use image::{Rgb, RgbImage};
use ndarray::Array3;
use std::cell::Cell;
use std::rc::Rc;

struct FixedDetector(Vec<Detection>);

impl FaceDetect for FixedDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        Ok(self.0.clone())
    }
}

struct FailingDetector;

impl FaceDetect for FailingDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        Err(DetectorError::InferenceFailed("session crashed".into()))
    }
}

/// Returns scripted logits in order and counts calls.
struct ScriptedClassifier {
    logits: Vec<Result<[f32; 2], ()>>,
    calls: Rc<Cell<usize>>,
    seen: Rc<Cell<(u32, u32)>>,
}

impl MakeupClassify for ScriptedClassifier {
    fn predict(&self, face: &RgbImage) -> Result<Classification, ClassifierError> {
        let i = self.calls.get();
        self.calls.set(i + 1);
        self.seen.set(face.dimensions());
        match self.logits[i] {
            Ok(l) => Ok(Classification::from_logits(l)),
            Err(()) => Err(ClassifierError::InferenceFailed("bad crop".into())),
        }
    }
}

struct UninitializedClassifier;

impl MakeupClassify for UninitializedClassifier {
    fn predict(&self, _face: &RgbImage) -> Result<Classification, ClassifierError> {
        Err(ClassifierError::NotInitialized)
    }
}

/// Fills the face with a constant; fails on faces narrower than `min_width`.
struct ConstantRemover {
    value: f32,
    min_width: u32,
    calls: Rc<Cell<usize>>,
}

impl MakeupRemove for ConstantRemover {
    fn remove_makeup(&self, face: &RgbImage) -> Result<Array3<f32>, GeneratorError> {
        self.calls.set(self.calls.get() + 1);
        if face.width() < self.min_width {
            return Err(GeneratorError::InvalidInput("too small".into()));
        }
        Ok(Array3::from_elem((face.height() as usize, face.width() as usize, 3), self.value))
    }
}

struct Harness {
    classifier_calls: Rc<Cell<usize>>,
    classifier_seen: Rc<Cell<(u32, u32)>>,
    remover_calls: Rc<Cell<usize>>,
}

fn build(
    detections: Vec<Detection>,
    logits: Vec<Result<[f32; 2], ()>>,
    config: PipelineConfig,
) -> (Pipeline<FixedDetector, ScriptedClassifier, ConstantRemover>, Harness) {
    let harness = Harness {
        classifier_calls: Rc::new(Cell::new(0)),
        classifier_seen: Rc::new(Cell::new((0, 0))),
        remover_calls: Rc::new(Cell::new(0)),
    };
    let pipeline = Pipeline::new(
        FixedDetector(detections),
        ScriptedClassifier {
            logits,
            calls: harness.classifier_calls.clone(),
            seen: harness.classifier_seen.clone(),
        },
        ConstantRemover {
            value: 1.0,
            min_width: 20,
            calls: harness.remover_calls.clone(),
        },
        config,
    );
    (pipeline, harness)
}

fn det(left: f32, top: f32, right: f32, bottom: f32) -> Detection {
    Detection { left, top, right, bottom, confidence: 0.98, landmarks: None }
}

fn photo(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| Rgb([(x % 200) as u8, (y % 200) as u8, 40]))
}

// logit pairs whose softmax gives roughly the stated confidence
const MAKEUP_087: [f32; 2] = [0.0, 1.9];
const CLEAN_095: [f32; 2] = [2.95, 0.0];

#[test]
fn no_faces_gives_empty_results_without_model_calls() {
    let (mut pipeline, h) = build(vec![], vec![], PipelineConfig::default());
    let results = pipeline.process(&photo(200, 200)).unwrap();

    assert!(results.is_empty());
    assert_eq!(h.classifier_calls.get(), 0);
    assert_eq!(h.remover_calls.get(), 0);
}

#[test]
fn makeup_face_is_transformed_and_restored() {
    let (mut pipeline, h) = build(
        vec![det(10.0, 10.0, 110.0, 110.0)],
        vec![Ok(MAKEUP_087)],
        PipelineConfig::default(),
    );
    let results = pipeline.process(&photo(200, 200)).unwrap();

    assert_eq!(results.len(), 1);
    let face = &results[0];
    assert_eq!(face.outcome, FaceOutcome::Transformed);
    assert_eq!(face.bbox, BoundingBox { left: 10, top: 10, right: 110, bottom: 110 });
    assert_eq!(face.original.dimensions(), (100, 100));
    assert_eq!(face.output.dimensions(), (100, 100));
    assert_eq!(face.output.get_pixel(50, 50), &Rgb([255, 255, 255]));

    let c = face.classification.unwrap();
    assert_eq!(c.class_index, 1);
    assert!((c.confidence - 0.87).abs() < 0.01);

    // Models saw the resized copy.
    assert_eq!(h.classifier_seen.get(), (96, 96));
    assert_eq!(h.remover_calls.get(), 1);
    assert_eq!(face.caption(), "makeup detected");
}

#[test]
fn clean_face_passes_through_unchanged() {
    let (mut pipeline, h) = build(
        vec![det(20.0, 30.0, 80.0, 110.0)],
        vec![Ok(CLEAN_095)],
        PipelineConfig::default(),
    );
    let results = pipeline.process(&photo(200, 200)).unwrap();

    let face = &results[0];
    assert_eq!(face.outcome, FaceOutcome::Passthrough);
    assert_eq!(face.output, face.original);
    assert_eq!(face.output.dimensions(), (60, 80));
    assert!((face.classification.unwrap().confidence - 0.95).abs() < 0.01);
    assert_eq!(h.remover_calls.get(), 0);
    assert_eq!(face.caption(), "No makeup detected.");
}

#[test]
fn unresized_crop_goes_to_models_directly() {
    let config = PipelineConfig { resize_faces: false, ..Default::default() };
    let (mut pipeline, h) = build(vec![det(0.0, 0.0, 64.0, 48.0)], vec![Ok(MAKEUP_087)], config);
    let results = pipeline.process(&photo(128, 128)).unwrap();

    assert_eq!(h.classifier_seen.get(), (64, 48));
    assert_eq!(results[0].output.dimensions(), (64, 48));
}

#[test]
fn per_face_failures_are_isolated() {
    let (mut pipeline, h) = build(
        vec![
            det(0.0, 0.0, 50.0, 50.0),
            det(60.0, 0.0, 110.0, 50.0),
            det(120.0, 0.0, 170.0, 50.0),
        ],
        vec![Err(()), Ok(MAKEUP_087), Ok(CLEAN_095)],
        PipelineConfig { resize_faces: true, face_size: 16 },
    );
    let results = pipeline.process(&photo(200, 100)).unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(h.classifier_calls.get(), 3);

    // Classifier failure: no classification, original shown.
    assert!(matches!(results[0].outcome, FaceOutcome::Failed { .. }));
    assert!(results[0].classification.is_none());
    assert_eq!(results[0].output, results[0].original);

    // Generator rejects the 16px input: classified, but failed, original shown.
    assert!(matches!(results[1].outcome, FaceOutcome::Failed { .. }));
    assert_eq!(results[1].classification.unwrap().class_index, 1);
    assert_eq!(results[1].output, results[1].original);
    assert!(results[1].caption().starts_with("processing failed"));

    // The next face is still processed.
    assert_eq!(results[2].outcome, FaceOutcome::Passthrough);
    assert_eq!(results.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn degenerate_boxes_are_skipped() {
    let (mut pipeline, h) = build(
        vec![det(500.0, 500.0, 600.0, 600.0), det(10.0, 10.0, 60.0, 60.0)],
        vec![Ok(CLEAN_095)],
        PipelineConfig::default(),
    );
    let results = pipeline.process(&photo(100, 100)).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(h.classifier_calls.get(), 1);
}

#[test]
fn missing_model_is_a_configuration_error() {
    let calls = Rc::new(Cell::new(0));
    let mut pipeline = Pipeline::new(
        FixedDetector(vec![det(10.0, 10.0, 60.0, 60.0)]),
        UninitializedClassifier,
        ConstantRemover { value: 0.0, min_width: 0, calls: calls.clone() },
        PipelineConfig::default(),
    );

    let err = pipeline.process(&photo(100, 100)).unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(ClassifierError::NotInitialized)));
    assert_eq!(calls.get(), 0);
}

#[test]
fn detector_failure_propagates() {
    let calls = Rc::new(Cell::new(0));
    let mut pipeline = Pipeline::new(
        FailingDetector,
        UninitializedClassifier,
        ConstantRemover { value: 0.0, min_width: 0, calls },
        PipelineConfig::default(),
    );
    assert!(matches!(pipeline.process(&photo(50, 50)), Err(PipelineError::Detector(_))));
}

#[test]
fn summary_serializes_outcome() {
    let (mut pipeline, _) = build(
        vec![det(10.0, 10.0, 110.0, 110.0)],
        vec![Ok(MAKEUP_087)],
        PipelineConfig::default(),
    );
    let results = pipeline.process(&photo(200, 200)).unwrap();
    let json = serde_json::to_value(results[0].summary()).unwrap();

    assert_eq!(json["index"], 0);
    assert_eq!(json["width"], 100);
    assert_eq!(json["class_index"], 1);
    assert_eq!(json["outcome"]["status"], "transformed");
    assert_eq!(json["bbox"]["right"], 110);
}
