use crate::model_config::{
    ClassLabel, INPUT_CHANNELS, INPUT_SIZE, LabelMap, LabelMapError, ModelConfig,
};
use image::DynamicImage;
use image::imageops::FilterType;
use ndarray::Array4;
use once_cell::sync::Lazy;
use ort::error::Error as OrtError;
use ort::inputs;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionOutputs};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] OrtError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Label map error: {0}")]
    LabelMap(#[from] LabelMapError),
    #[error("Invalid path for model files: {0}")]
    InvalidPath(String),
    #[error("Model has no inputs or outputs")]
    MissingIo,
    #[error("Model output format unexpected")]
    OutputFormatUnexpected,
    #[error("Model produced no scores")]
    NoScores,
    #[error("Model predicted class {0}, which has no label")]
    UnmappedClass(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    NoTumorDetected,
    TumorDetected,
}

impl Verdict {
    pub fn advice(self) -> &'static str {
        match self {
            Verdict::TumorDetected => {
                "Tumor detected! Please consult a healthcare provider immediately."
            }
            Verdict::NoTumorDetected => {
                "No tumor detected. Keep up with regular health check-ups to stay healthy!"
            }
        }
    }
}

/// Anything that maps a normalized scan tensor to per-class scores.
pub trait ScoreModel: Send + Sync {
    fn scores(&self, input: &Array4<f32>) -> Result<Vec<f32>, ModelError>;
    fn labels(&self) -> &LabelMap;
    fn version(&self) -> &str;
}

/// Resizes to the model's fixed input and rescales to [0, 1].
///
/// The result is NHWC with shape `(1, 128, 128, 3)` whatever the source size.
pub fn preprocess(image: &DynamicImage) -> Array4<f32> {
    let resized = image.resize_exact(INPUT_SIZE as u32, INPUT_SIZE as u32, FilterType::Triangle);
    let rgb_image = resized.to_rgb8();

    let mut array = Array4::<f32>::zeros((1, INPUT_SIZE, INPUT_SIZE, INPUT_CHANNELS));
    for (x, y, pixel) in rgb_image.enumerate_pixels() {
        for c in 0..INPUT_CHANNELS {
            array[[0, y as usize, x as usize, c]] = f32::from(pixel[c]) / 255.0;
        }
    }
    array
}

/// Index of the first maximal score. A NaN counts as the maximum, so the
/// first NaN wins, matching numpy's `argmax`.
fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            return Some(index);
        }
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    best.map(|(index, _)| index)
}

pub fn decide(scores: &[f32], labels: &LabelMap) -> Result<Verdict, ModelError> {
    let index = argmax(scores).ok_or(ModelError::NoScores)?;
    match labels.label(index) {
        Some(ClassLabel::Tumor) => Ok(Verdict::TumorDetected),
        Some(ClassLabel::NoTumor) => Ok(Verdict::NoTumorDetected),
        None => Err(ModelError::UnmappedClass(index)),
    }
}

pub fn classify(model: &dyn ScoreModel, image: &DynamicImage) -> Result<Verdict, ModelError> {
    let tensor = preprocess(image);
    let scores = model.scores(&tensor)?;
    decide(&scores, model.labels())
}

pub struct OnnxClassifier {
    session: Session,
    input_name: String,
    output_name: String,
    labels: LabelMap,
    version: String,
}

impl OnnxClassifier {
    pub fn new(model_dir: &Path) -> Result<Self, ModelError> {
        let model_path = model_dir.join("model.onnx");
        let config_path = model_dir.join("config.json");

        if !model_path.exists() {
            return Err(ModelError::InvalidPath(format!(
                "Model file not found: {:?}",
                model_path
            )));
        }

        let (labels, version) = if config_path.exists() {
            let config_file = std::fs::File::open(&config_path)?;
            let config: ModelConfig = serde_json::from_reader(config_file)?;
            let version = config.model_version.unwrap_or_else(|| "unversioned".to_string());
            (LabelMap::new(config.id2label)?, version)
        } else {
            warn!(
                path = ?config_path,
                "no label map found, assuming class 0 = no tumor, class 1 = tumor"
            );
            (LabelMap::default(), "unversioned".to_string())
        };

        info!(path = ?model_path, "loading ONNX model");
        let session = SessionBuilder::new()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_cpus::get())?
            .commit_from_file(&model_path)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or(ModelError::MissingIo)?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or(ModelError::MissingIo)?;

        info!(%input_name, %output_name, %version, "ONNX Runtime session created");

        Ok(Self {
            session,
            input_name,
            output_name,
            labels,
            version,
        })
    }
}

impl ScoreModel for OnnxClassifier {
    fn scores(&self, input: &Array4<f32>) -> Result<Vec<f32>, ModelError> {
        let inputs = inputs![self.input_name.as_str() => input.view().into_dyn()]?;
        let outputs: SessionOutputs = self.session.run(inputs)?;

        let output_value = outputs
            .get(self.output_name.as_str())
            .ok_or(ModelError::OutputFormatUnexpected)?;

        // Shape is [1, num_classes].
        let scores_view = output_value.try_extract_tensor::<f32>()?;
        Ok(scores_view.iter().copied().collect())
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }

    fn version(&self) -> &str {
        &self.version
    }
}

pub static GLOBAL_CLASSIFIER: Lazy<Result<Arc<OnnxClassifier>, ModelError>> = Lazy::new(|| {
    let model_dir = crate::config::model_dir_from_env();
    info!(model_dir = %model_dir.display(), "initializing classifier");
    OnnxClassifier::new(&model_dir).map(Arc::new)
});
