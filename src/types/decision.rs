//! Decision, attribution and report data structures

use crate::feature_encoder::FeatureVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary loan outcome. Model class 1 is approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approved,
    Rejected,
}

impl Verdict {
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Approved => "Approved",
            Verdict::Rejected => "Rejected",
        }
    }

    pub fn is_approved(self) -> bool {
        self == Verdict::Approved
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Class probabilities, `approve + reject == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityPair {
    pub approve: f64,
    pub reject: f64,
}

impl ProbabilityPair {
    /// Build from P(approve), clamped to [0, 1].
    pub fn from_approve(approve: f64) -> Self {
        let approve = approve.clamp(0.0, 1.0);
        Self {
            approve,
            reject: 1.0 - approve,
        }
    }
}

/// Outcome of scoring one feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    /// Present when the classifier exposes class probabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<ProbabilityPair>,
    /// Raw model output (margin for boosted trees)
    pub raw_output: f64,
}

/// Signed contribution of one feature to a single prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    /// Encoded feature value the contribution was computed for
    pub value: f64,
    pub contribution: f64,
}

/// Per-feature decomposition of one raw model output.
///
/// `baseline + Σ contribution ≈ raw_output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    /// Expected model output over the reference distribution
    pub baseline: f64,
    /// Contributions in schema order
    pub contributions: Vec<FeatureContribution>,
    pub raw_output: f64,
}

impl Attribution {
    /// Baseline plus every contribution.
    pub fn reconstructed_output(&self) -> f64 {
        self.baseline + self.contributions.iter().map(|c| c.contribution).sum::<f64>()
    }

    /// Whether baseline and contributions add up to the raw output.
    ///
    /// Tolerance is absolute below 1.0 and relative above it.
    pub fn is_additive(&self, tolerance: f64) -> bool {
        let scale = self.raw_output.abs().max(1.0);
        (self.reconstructed_output() - self.raw_output).abs() <= tolerance * scale
    }

    pub fn contribution(&self, feature: &str) -> Option<f64> {
        self.contributions
            .iter()
            .find(|c| c.feature == feature)
            .map(|c| c.contribution)
    }

    /// Contributions sorted by absolute size, largest first.
    pub fn ranked(&self) -> Vec<&FeatureContribution> {
        let mut ranked: Vec<&FeatureContribution> = self.contributions.iter().collect();
        ranked.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));
        ranked
    }
}

/// Everything returned for one applicant request.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    /// Unique request identifier
    pub request_id: String,

    /// Report generation timestamp
    pub timestamp: DateTime<Utc>,

    /// Version of the training schema the input was encoded against
    pub schema_version: String,

    pub decision: Decision,

    /// Encoded model input, in training order
    pub features: FeatureVector,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution: Option<Attribution>,

    /// Set when the decision is returned without an explanation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation_notice: Option<String>,
}

impl PredictionReport {
    /// Create a decision-only report
    pub fn new(decision: Decision, features: FeatureVector) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            schema_version: features.schema_version().to_string(),
            decision,
            features,
            attribution: None,
            explanation_notice: None,
        }
    }

    /// Attach the attribution for this decision
    pub fn with_attribution(mut self, attribution: Attribution) -> Self {
        self.attribution = Some(attribution);
        self.explanation_notice = None;
        self
    }

    /// Mark the report as decision-only
    pub fn with_explanation_notice(mut self, notice: impl Into<String>) -> Self {
        self.attribution = None;
        self.explanation_notice = Some(notice.into());
        self
    }

    pub fn verdict(&self) -> Verdict {
        self.decision.verdict
    }
}
