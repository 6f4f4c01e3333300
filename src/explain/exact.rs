//! Model-agnostic exact Shapley values against a background set.
//!
//! The value of a coalition S is the mean model output over the background
//! rows with the features in S replaced by the explained row's values. Every
//! coalition is evaluated, so the cost is 2^M · |background| model calls.

use super::{build_attribution, Explainer};
use crate::error::ExplanationUnavailable;
use crate::feature_encoder::FeatureVector;
use crate::models::Classifier;
use crate::types::decision::Attribution;
use std::sync::Arc;

/// Coalition enumeration is exponential in the feature count.
pub const MAX_FEATURES: usize = 16;

pub struct ExactShapleyExplainer {
    classifier: Arc<dyn Classifier>,
    /// Reference rows in training order
    background: Vec<Vec<f64>>,
    /// Shapley weight for a coalition of each size
    weights: Vec<f64>,
}

impl ExactShapleyExplainer {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        background: Vec<Vec<f64>>,
    ) -> Result<Self, ExplanationUnavailable> {
        let m = classifier.feature_names().len();
        if m == 0 {
            return Err(ExplanationUnavailable::new("model declares no features"));
        }
        if m > MAX_FEATURES {
            return Err(ExplanationUnavailable::new(format!(
                "{} features exceed the exact Shapley limit of {}",
                m, MAX_FEATURES
            )));
        }
        if background.is_empty() {
            return Err(ExplanationUnavailable::new(
                "exact Shapley explainer needs at least one background row",
            ));
        }
        if let Some(row) = background.iter().find(|row| row.len() != m) {
            return Err(ExplanationUnavailable::new(format!(
                "background row has {} values, model expects {}",
                row.len(),
                m
            )));
        }

        // |S|! (M - |S| - 1)! / M!
        let factorial = |n: usize| (1..=n).map(|k| k as f64).product::<f64>();
        let weights = (0..m)
            .map(|size| factorial(size) * factorial(m - size - 1) / factorial(m))
            .collect();

        Ok(Self {
            classifier,
            background,
            weights,
        })
    }

    /// Mean output over the background with coalition `mask` taken from `vector`.
    fn coalition_value(
        &self,
        vector: &FeatureVector,
        mask: usize,
    ) -> Result<f64, ExplanationUnavailable> {
        let mut total = 0.0;
        for reference in &self.background {
            let values = reference
                .iter()
                .zip(vector.values())
                .enumerate()
                .map(|(i, (b, x))| if mask & (1 << i) != 0 { *x } else { *b })
                .collect();
            total += self
                .classifier
                .raw_output(&vector.with_values(values))
                .map_err(|e| ExplanationUnavailable::new(e.to_string()))?;
        }
        Ok(total / self.background.len() as f64)
    }
}

impl Explainer for ExactShapleyExplainer {
    fn name(&self) -> &'static str {
        "exact_shapley"
    }

    fn explain(&self, vector: &FeatureVector) -> Result<Attribution, ExplanationUnavailable> {
        let m = self.weights.len();
        if vector.len() != m {
            return Err(ExplanationUnavailable::new(format!(
                "model expects {} features, vector has {}",
                m,
                vector.len()
            )));
        }

        let values = (0..1usize << m)
            .map(|mask| self.coalition_value(vector, mask))
            .collect::<Result<Vec<f64>, _>>()?;

        let phi: Vec<f64> = (0..m)
            .map(|i| {
                let bit = 1usize << i;
                (0..values.len())
                    .filter(|mask| mask & bit == 0)
                    .map(|mask| {
                        self.weights[mask.count_ones() as usize] * (values[mask | bit] - values[mask])
                    })
                    .sum::<f64>()
            })
            .collect();

        let baseline = values[0];
        let raw_output = self
            .classifier
            .raw_output(vector)
            .map_err(|e| ExplanationUnavailable::new(e.to_string()))?;

        build_attribution(vector, baseline, phi, raw_output)
    }
}
