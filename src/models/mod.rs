//! ML model components: artifact loading, classifier backends and the
//! decision service built on top of them

pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod tree;

pub use inference::{DecisionService, ServiceBuilder};
pub use loader::{LoadedModel, ModelLoader};
pub use tree::TreeEnsemble;

use crate::error::RequestError;
use crate::feature_encoder::FeatureVector;
use serde::{Deserialize, Serialize};

/// How a classifier's raw output maps to an approval probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Objective {
    /// Raw output is a log-odds margin; P(approve) = sigmoid(raw)
    #[default]
    #[serde(rename = "binary:logistic")]
    Logistic,
    /// Raw output already is P(approve)
    #[serde(rename = "probability")]
    Probability,
    /// Raw output is a signed score without calibrated probabilities;
    /// approved iff raw > 0
    #[serde(rename = "margin")]
    Margin,
}

impl Objective {
    /// P(approve) for a raw output, when this objective exposes one.
    pub fn approve_probability(self, raw: f64) -> Option<f64> {
        match self {
            Objective::Logistic => Some(1.0 / (1.0 + (-raw).exp())),
            Objective::Probability => Some(raw.clamp(0.0, 1.0)),
            Objective::Margin => None,
        }
    }

    /// Unit of the raw output, and so of SHAP values computed on it.
    pub fn output_unit(self) -> &'static str {
        match self {
            Objective::Logistic => "log-odds",
            Objective::Probability => "probability",
            Objective::Margin => "margin",
        }
    }
}

/// A loaded binary classifier.
///
/// Class 1 is approval. Implementations only ever see vectors produced by
/// the feature encoder, and the service checks names and order against
/// [`Classifier::feature_names`] before scoring.
pub trait Classifier: Send + Sync {
    /// Backend name used in logs
    fn backend(&self) -> &'static str;

    /// Training column names in training order.
    fn feature_names(&self) -> &[String];

    fn objective(&self) -> Objective;

    /// Raw model output for one row (margin for boosted trees).
    fn raw_output(&self, vector: &FeatureVector) -> Result<f64, RequestError>;
}

/// Verify that a vector carries exactly the classifier's training columns,
/// in training order.
pub fn check_schema(classifier: &dyn Classifier, vector: &FeatureVector) -> Result<(), RequestError> {
    let expected = classifier.feature_names();
    if vector.len() != expected.len() {
        return Err(RequestError::schema_mismatch(
            "feature_vector",
            format!(
                "model expects {} features, vector has {}",
                expected.len(),
                vector.len()
            ),
        ));
    }

    for (position, (got, want)) in vector.names().iter().zip(expected).enumerate() {
        if got != want {
            return Err(RequestError::schema_mismatch(
                got.clone(),
                format!("position {} holds `{}`, model expects `{}`", position, got, want),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logistic_probability() {
        assert_eq!(Objective::Logistic.approve_probability(0.0), Some(0.5));
        let p = Objective::Logistic.approve_probability(2.0).unwrap();
        assert!((p - 0.880797).abs() < 1e-6);
    }

    #[test]
    fn test_margin_has_no_probability() {
        assert_eq!(Objective::Margin.approve_probability(1.3), None);
        assert_eq!(Objective::Probability.approve_probability(1.3), Some(1.0));
    }

    #[test]
    fn test_objective_names() {
        let objective: Objective = serde_json::from_str(r#""binary:logistic""#).unwrap();
        assert_eq!(objective, Objective::Logistic);
        let objective: Objective = serde_json::from_str(r#""margin""#).unwrap();
        assert_eq!(objective, Objective::Margin);
    }
}
