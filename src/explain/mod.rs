//! Per-prediction feature attribution engines

pub mod exact;
pub mod tree_shap;

pub use exact::ExactShapleyExplainer;
pub use tree_shap::TreeExplainer;

use crate::error::ExplanationUnavailable;
use crate::feature_encoder::FeatureVector;
use crate::types::decision::{Attribution, FeatureContribution};

/// Largest allowed gap between `baseline + Σ contributions` and the raw
/// model output, relative to max(1, |raw|).
pub const ADDITIVITY_TOLERANCE: f64 = 1e-4;

/// Decomposes one prediction into per-feature contributions.
///
/// An explainer owns a handle to the model it explains, so the attribution
/// is always computed against the classifier that produced the decision.
pub trait Explainer: Send + Sync {
    /// Engine name used in logs
    fn name(&self) -> &'static str;

    fn explain(&self, vector: &FeatureVector) -> Result<Attribution, ExplanationUnavailable>;
}

/// Assemble an attribution in schema order and check additivity.
pub(crate) fn build_attribution(
    vector: &FeatureVector,
    baseline: f64,
    phi: Vec<f64>,
    raw_output: f64,
) -> Result<Attribution, ExplanationUnavailable> {
    let contributions = vector
        .iter()
        .zip(phi)
        .map(|((feature, value), contribution)| FeatureContribution {
            feature: feature.to_string(),
            value,
            contribution,
        })
        .collect();

    let attribution = Attribution {
        baseline,
        contributions,
        raw_output,
    };

    if !attribution.is_additive(ADDITIVITY_TOLERANCE) {
        return Err(ExplanationUnavailable::new(format!(
            "contributions do not add up: baseline + sum = {:.6}, model output = {:.6}",
            attribution.reconstructed_output(),
            raw_output
        )));
    }

    Ok(attribution)
}
