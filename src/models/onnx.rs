//! ONNX classifier backend
//!
//! Scores a `[1, n]` float tensor in training column order and reads the
//! approval (class 1) probability from the model's probability output.

use super::{Classifier, Objective};
use crate::error::{ModelLoadError, RequestError};
use crate::feature_encoder::FeatureVector;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Loaded ONNX session with its input/output names
pub struct OnnxClassifier {
    feature_names: Vec<String>,
    /// Sessions need exclusive access to run
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    /// Load an ONNX classifier from file
    pub fn load(
        path: &Path,
        feature_names: &[String],
        threads: usize,
    ) -> Result<Self, ModelLoadError> {
        let onnx = |e: ort::Error| ModelLoadError::Onnx(format!("{}: {}", path.display(), e));

        ort::init().commit().map_err(onnx)?;
        info!(path = %path.display(), threads = threads, "Loading ONNX model");

        let session = Session::builder()
            .map_err(onnx)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(onnx)?
            .with_intra_threads(threads)
            .map_err(onnx)?
            .commit_from_file(path)
            .map_err(onnx)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(
            input = %input_name,
            output = %output_name,
            features = feature_names.len(),
            "ONNX model loaded"
        );

        Ok(Self {
            feature_names: feature_names.to_vec(),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn backend(&self) -> &'static str {
        "onnx"
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn objective(&self) -> Objective {
        Objective::Probability
    }

    fn raw_output(&self, vector: &FeatureVector) -> Result<f64, RequestError> {
        let scoring = |e: ort::Error| RequestError::Scoring(e.to_string());

        // Prepare input tensor - shape [1, num_features]
        let shape = vec![1_i64, vector.len() as i64];
        let row: Vec<f32> = vector.values().iter().map(|&v| v as f32).collect();
        let input_tensor = Tensor::from_array((shape, row)).map_err(scoring)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RequestError::Scoring(format!("session lock poisoned: {}", e)))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(scoring)?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            RequestError::Scoring(format!("model has no `{}` output", self.output_name))
        })?;
        let (shape, data) = output.try_extract_tensor::<f32>().map_err(scoring)?;

        let probability = approval_probability(shape.iter().copied().collect(), data)
            .ok_or_else(|| RequestError::Scoring("empty probability output".to_string()))?;
        debug!(probability = probability, "ONNX inference complete");

        Ok(probability)
    }
}

/// Class 1 probability from a `[batch, classes]`, `[classes]` or single
/// probability tensor.
fn approval_probability(dims: Vec<i64>, data: &[f32]) -> Option<f64> {
    let classes = dims.last().copied().unwrap_or(0);
    let value = if classes >= 2 { data.get(1) } else { data.first() };
    value.map(|&v| v as f64)
}
