use facewash_core::generator::LEAKY_RELU_SLOPE;
use facewash_core::{
    default_model_dir, Activation, ClassifierArch, GeneratorConfig, ModelDir, PipelineConfig,
};
use std::path::PathBuf;

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the ONNX models and the generator checkpoint.
    pub model_dir: PathBuf,
    /// Classifier selected at startup.
    pub classifier: ClassifierArch,
    /// Side of the square faces are resized to for the models.
    pub face_size: u32,
    /// Whether models see resized faces or the raw crops.
    pub resize_faces: bool,
    /// Generator base filter count.
    pub generator_filters: usize,
    /// Generator residual block count.
    pub generator_blocks: usize,
    /// Use plain ReLU in the generator's encoder blocks.
    pub encoder_relu: bool,
    /// Where rendered faces are written.
    pub out_dir: PathBuf,
}

impl Config {
    /// Load configuration from `FACEWASH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEWASH_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_model_dir());

        let classifier = std::env::var("FACEWASH_CLASSIFIER")
            .ok()
            .and_then(|v| match v.parse() {
                Ok(arch) => Some(arch),
                Err(e) => {
                    tracing::warn!(value = %v, error = %e, "ignoring FACEWASH_CLASSIFIER");
                    None
                }
            })
            .unwrap_or_default();

        Self {
            model_dir,
            classifier,
            face_size: env_parse("FACEWASH_FACE_SIZE", 96),
            resize_faces: std::env::var("FACEWASH_RESIZE_FACES")
                .map(|v| v != "0")
                .unwrap_or(true),
            generator_filters: env_parse("FACEWASH_GENERATOR_FILTERS", 64),
            generator_blocks: env_parse("FACEWASH_GENERATOR_BLOCKS", 9),
            encoder_relu: std::env::var("FACEWASH_ENCODER_RELU")
                .map(|v| v == "1")
                .unwrap_or(false),
            out_dir: std::env::var("FACEWASH_OUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("facewash-out")),
        }
    }

    pub fn models(&self) -> ModelDir {
        ModelDir::new(&self.model_dir)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            resize_faces: self.resize_faces,
            face_size: self.face_size,
        }
    }

    pub fn generator(&self) -> GeneratorConfig {
        let encoder_activation = if self.encoder_relu {
            Activation::Relu
        } else {
            Activation::LeakyRelu(LEAKY_RELU_SLOPE)
        };
        GeneratorConfig {
            filters: self.generator_filters,
            n_blocks: self.generator_blocks,
            encoder_activation,
            ..Default::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            model_dir: PathBuf::from("/tmp/models"),
            classifier: ClassifierArch::MobileNetV3Large,
            face_size: 128,
            resize_faces: false,
            generator_filters: 32,
            generator_blocks: 6,
            encoder_relu: false,
            out_dir: PathBuf::from("out"),
        }
    }

    #[test]
    fn test_generator_config_follows_flags() {
        let mut config = sample();
        let gen = config.generator();
        assert_eq!(gen.filters, 32);
        assert_eq!(gen.n_blocks, 6);
        assert_eq!(gen.encoder_activation, Activation::LeakyRelu(LEAKY_RELU_SLOPE));

        config.encoder_relu = true;
        assert_eq!(config.generator().encoder_activation, Activation::Relu);
    }

    #[test]
    fn test_pipeline_config() {
        let pipeline = sample().pipeline();
        assert!(!pipeline.resize_faces);
        assert_eq!(pipeline.face_size, 128);
    }

    #[test]
    fn test_model_paths_under_root() {
        let models = sample().models();
        assert!(models.classifier_path(ClassifierArch::Resnet34).starts_with("/tmp/models"));
    }

    #[test]
    fn test_env_parse_default_when_unset() {
        assert_eq!(env_parse("FACEWASH_TEST_UNSET_VARIABLE", 7usize), 7);
    }
}
