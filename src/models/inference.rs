//! Prediction & explanation service
//!
//! [`ServiceBuilder`] is the uninitialized state: configuration only, no
//! model. Loading the artifact yields a [`DecisionService`], the ready state.
//! There is no way back: a different model means a new process.

use super::loader::{LoadedModel, ModelLoader};
use super::{check_schema, Classifier, Objective};
use crate::error::{ExplanationUnavailable, ModelLoadError, RequestError};
use crate::explain::Explainer;
use crate::feature_encoder::{FeatureEncoder, FeatureVector};
use crate::types::applicant::ApplicantInput;
use crate::types::decision::{Attribution, Decision, PredictionReport, ProbabilityPair, Verdict};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default P(approve) cut-off
pub const DEFAULT_APPROVAL_THRESHOLD: f64 = 0.5;

/// Service configuration before a model is loaded.
#[derive(Debug, Clone)]
pub struct ServiceBuilder {
    approval_threshold: f64,
    onnx_threads: usize,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            approval_threshold: DEFAULT_APPROVAL_THRESHOLD,
            onnx_threads: 1,
        }
    }

    /// P(approve) at or above which a loan is approved. Values outside
    /// (0, 1) fall back to the default.
    pub fn approval_threshold(mut self, threshold: f64) -> Self {
        if threshold > 0.0 && threshold < 1.0 {
            self.approval_threshold = threshold;
        } else {
            warn!(
                threshold = threshold,
                default = DEFAULT_APPROVAL_THRESHOLD,
                "Approval threshold outside (0, 1), using default"
            );
        }
        self
    }

    pub fn onnx_threads(mut self, threads: usize) -> Self {
        self.onnx_threads = threads;
        self
    }

    /// Load the model artifact and become ready.
    pub fn load<P: AsRef<Path>>(self, artifact: P) -> Result<DecisionService, ModelLoadError> {
        let model = ModelLoader::with_threads(self.onnx_threads).load_artifact(artifact)?;
        Ok(self.with_model(model))
    }

    /// Become ready with an already loaded model.
    pub fn with_model(self, model: LoadedModel) -> DecisionService {
        info!(
            model = %model.name,
            approval_threshold = self.approval_threshold,
            explanations = model.explainer.is_ok(),
            "Decision service ready"
        );

        DecisionService {
            model_name: model.name,
            encoder: FeatureEncoder::new(model.schema),
            classifier: model.classifier,
            explainer: model.explainer,
            approval_threshold: self.approval_threshold,
        }
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Ready service: encodes applicants, scores them and explains the score.
///
/// Holds the model read-only; every call is independent, so one service can
/// be shared across threads behind an `Arc`.
pub struct DecisionService {
    model_name: String,
    encoder: FeatureEncoder,
    classifier: Arc<dyn Classifier>,
    explainer: Result<Box<dyn Explainer>, ExplanationUnavailable>,
    approval_threshold: f64,
}

impl DecisionService {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    pub fn approval_threshold(&self) -> f64 {
        self.approval_threshold
    }

    pub fn objective(&self) -> Objective {
        self.classifier.objective()
    }

    /// Whether the attribution engine initialized.
    pub fn explanations_available(&self) -> bool {
        self.explainer.is_ok()
    }

    /// Encode an applicant into the model's feature vector.
    pub fn encode(&self, input: &ApplicantInput) -> Result<FeatureVector, RequestError> {
        self.encoder.encode(input)
    }

    /// Score one vector.
    pub fn predict(&self, vector: &FeatureVector) -> Result<Decision, RequestError> {
        check_schema(self.classifier.as_ref(), vector)?;

        let raw_output = self.classifier.raw_output(vector)?;
        if !raw_output.is_finite() {
            return Err(RequestError::Scoring(format!(
                "model returned a non-finite output ({})",
                raw_output
            )));
        }

        let objective = self.classifier.objective();
        let probability = objective
            .approve_probability(raw_output)
            .map(ProbabilityPair::from_approve);
        let approved = match probability {
            Some(p) => p.approve >= self.approval_threshold,
            None => raw_output > 0.0,
        };

        Ok(Decision {
            verdict: if approved {
                Verdict::Approved
            } else {
                Verdict::Rejected
            },
            probability,
            raw_output,
        })
    }

    /// Attribute one vector's raw output to its features.
    ///
    /// Must be called with the same vector that was passed to
    /// [`predict`](Self::predict).
    pub fn explain(&self, vector: &FeatureVector) -> Result<Attribution, ExplanationUnavailable> {
        let explainer = self.explainer.as_ref().map_err(|e| e.clone())?;
        check_schema(self.classifier.as_ref(), vector)
            .map_err(|e| ExplanationUnavailable::new(e.to_string()))?;
        explainer.explain(vector)
    }

    /// Full pipeline for one applicant: encode, predict and explain against
    /// the same vector.
    ///
    /// Encoding and scoring failures reject the request. An explanation
    /// failure only downgrades the report to decision-only.
    pub fn evaluate(&self, input: &ApplicantInput) -> Result<PredictionReport, RequestError> {
        let vector = self.encode(input)?;
        let decision = self.predict(&vector)?;

        debug!(
            verdict = %decision.verdict,
            raw_output = decision.raw_output,
            approve_probability = decision.probability.map(|p| p.approve),
            "Prediction complete"
        );

        let explanation = self.explain(&vector);
        let report = PredictionReport::new(decision, vector);

        Ok(match explanation {
            Ok(attribution) => report.with_attribution(attribution),
            Err(e) => {
                warn!(reason = %e.reason, "Returning decision without explanation");
                report.with_explanation_notice(format!(
                    "An explanation could not be generated for this decision ({})",
                    e.reason
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::ADDITIVITY_TOLERANCE;
    use crate::models::loader::tests::{artifact_document, ARTIFACT};
    use crate::models::loader::ExplainerDocument;
    use crate::schema::FeatureSchema;
    use std::io::Write;

    fn service() -> DecisionService {
        let model = ModelLoader::new()
            .load_document(artifact_document(), Path::new("."))
            .unwrap();
        ServiceBuilder::new().with_model(model)
    }

    fn applicant() -> ApplicantInput {
        ApplicantInput {
            dependents: Some(2.0.into()),
            education: Some("Graduate".to_string().into()),
            self_employed: Some("No".to_string().into()),
            loan_term: Some(360.0.into()),
            credit_score: Some(750.0.into()),
            residential_assets: Some(500_000.0.into()),
            commercial_assets: Some(0.0.into()),
            bank_assets: Some(100_000.0.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_scenario_graduate_applicant() {
        let service = service();
        let vector = service.encode(&applicant()).unwrap();

        assert_eq!(vector.get("education"), Some(1.0));
        assert_eq!(vector.get("self_employed"), Some(0.0));
        assert_eq!(vector.names(), service.encoder().feature_names());

        let decision = service.predict(&vector).unwrap();
        // 0.2 + 1.6 - 0.15 + 0.12
        assert!((decision.raw_output - 1.77).abs() < 1e-12);
        assert_eq!(decision.verdict, Verdict::Approved);
        let p = decision.probability.unwrap();
        assert!((p.approve + p.reject - 1.0).abs() < 1e-12);

        let attribution = service.explain(&vector).unwrap();
        assert_eq!(attribution.contributions.len(), 8);
        let names: Vec<&str> = attribution
            .contributions
            .iter()
            .map(|c| c.feature.as_str())
            .collect();
        assert_eq!(names, vector.names().iter().map(String::as_str).collect::<Vec<_>>());
        assert!(attribution.is_additive(ADDITIVITY_TOLERANCE));
        assert_eq!(attribution.raw_output, decision.raw_output);
    }

    #[test]
    fn test_low_credit_score_is_scored_not_refused() {
        let service = service();
        let mut input = applicant();
        input.credit_score = Some(250.0.into());

        let report = service.evaluate(&input).unwrap();
        assert_eq!(report.verdict(), Verdict::Rejected);
        assert!(report.attribution.is_some());
    }

    #[test]
    fn test_missing_field_rejects_request() {
        let service = service();
        let mut input = applicant();
        input.loan_term = None;

        let err = service.evaluate(&input).unwrap_err();
        assert!(matches!(err, RequestError::SchemaMismatch { .. }));
        assert_eq!(err.field(), Some("loan_term"));
    }

    #[test]
    fn test_vector_from_other_schema_is_refused() {
        let service = service();
        let mut doc = artifact_document().schema;
        doc.features.swap(0, 1);
        let drifted = FeatureEncoder::new(Arc::new(FeatureSchema::from_document(doc).unwrap()));
        let vector = drifted.encode(&applicant()).unwrap();

        let err = service.predict(&vector).unwrap_err();
        assert!(matches!(err, RequestError::SchemaMismatch { .. }));
        assert!(service.explain(&vector).is_err());
    }

    #[test]
    fn test_explainer_failure_degrades_to_decision_only() {
        let mut doc = artifact_document();
        doc.explainer = Some(ExplainerDocument::ExactShapley {
            background: Vec::new(),
        });
        let model = ModelLoader::new().load_document(doc, Path::new(".")).unwrap();
        let service = ServiceBuilder::new().with_model(model);

        assert!(!service.explanations_available());
        let report = service.evaluate(&applicant()).unwrap();
        assert_eq!(report.verdict(), Verdict::Approved);
        assert!(report.attribution.is_none());
        assert!(report
            .explanation_notice
            .as_deref()
            .unwrap()
            .contains("could not be generated"));
    }

    #[test]
    fn test_approval_threshold() {
        let model = ModelLoader::new()
            .load_document(artifact_document(), Path::new("."))
            .unwrap();
        // sigmoid(1.77) ~= 0.854
        let strict = ServiceBuilder::new().approval_threshold(0.9).with_model(model);

        let report = strict.evaluate(&applicant()).unwrap();
        assert_eq!(report.verdict(), Verdict::Rejected);
        assert_eq!(strict.approval_threshold(), 0.9);

        let ignored = ServiceBuilder::new().approval_threshold(1.5);
        assert_eq!(ignored.approval_threshold, DEFAULT_APPROVAL_THRESHOLD);
    }

    #[test]
    fn test_margin_objective_has_no_probability() {
        let mut doc = artifact_document();
        if let crate::models::loader::ModelDocument::TreeEnsemble(ensemble) = &mut doc.model {
            ensemble.objective = Objective::Margin;
        }
        let model = ModelLoader::new().load_document(doc, Path::new(".")).unwrap();
        let service = ServiceBuilder::new().with_model(model);

        let decision = service.predict(&service.encode(&applicant()).unwrap()).unwrap();
        assert_eq!(decision.probability, None);
        assert_eq!(decision.verdict, Verdict::Approved);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let service = service();
        let vector = service.encode(&applicant()).unwrap();

        assert_eq!(
            service.predict(&vector).unwrap(),
            service.predict(&vector).unwrap()
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ARTIFACT.as_bytes()).unwrap();

        let service = ServiceBuilder::new().load(file.path()).unwrap();
        assert_eq!(service.model_name(), "loan-approval-xgb");
        assert!(service.explanations_available());
    }

    #[test]
    fn test_shipped_model() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("models/loan_model.json");
        let service = ServiceBuilder::new().load(path).unwrap();
        assert!(service.explanations_available());

        let report = service.evaluate(&applicant()).unwrap();
        assert_eq!(report.verdict(), Verdict::Approved);
        assert!(report.attribution.as_ref().unwrap().is_additive(ADDITIVITY_TOLERANCE));

        let mut input = applicant();
        input.credit_score = Some(250.0.into());
        let report = service.evaluate(&input).unwrap();
        assert_eq!(report.verdict(), Verdict::Rejected);
        let attribution = report.attribution.unwrap();
        assert_eq!(attribution.ranked()[0].feature, "cibil_score");
    }

    #[test]
    fn test_load_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ServiceBuilder::new().load(dir.path().join("missing.json")).is_err());
    }
}
