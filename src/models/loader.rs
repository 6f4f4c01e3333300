//! Model artifact loader
//!
//! An artifact is a JSON manifest bundling the training schema (feature
//! names, order, encoding tables) with the classifier it belongs to and the
//! attribution engine to use for it.

use super::tree::{TreeEnsemble, TreeEnsembleDocument};
use super::Classifier;
use crate::error::{ExplanationUnavailable, ModelLoadError};
use crate::explain::{ExactShapleyExplainer, Explainer, TreeExplainer};
use crate::schema::{FeatureSchema, SchemaDocument};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Artifact manifest, as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDocument {
    pub name: String,
    pub schema: SchemaDocument,
    pub model: ModelDocument,
    #[serde(default)]
    pub explainer: Option<ExplainerDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelDocument {
    TreeEnsemble(TreeEnsembleDocument),
    /// ONNX classifier file, relative to the manifest
    Onnx { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExplainerDocument {
    /// TreeSHAP over the ensemble's node covers
    Tree,
    /// Exact Shapley values against encoded background rows keyed by
    /// feature name
    ExactShapley {
        #[serde(default)]
        background: Vec<BTreeMap<String, f64>>,
    },
}

/// Loaded artifact: schema, classifier and attribution engine.
pub struct LoadedModel {
    /// Artifact name
    pub name: String,
    pub schema: Arc<FeatureSchema>,
    pub classifier: Arc<dyn Classifier>,
    /// Attribution engine, or why it could not be initialized
    pub explainer: Result<Box<dyn Explainer>, ExplanationUnavailable>,
}

/// Loader for model artifacts
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of ONNX threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load an artifact manifest from file
    pub fn load_artifact<P: AsRef<Path>>(&self, path: P) -> Result<LoadedModel, ModelLoadError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading model artifact");

        let bytes = std::fs::read(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: ArtifactDocument =
            serde_json::from_slice(&bytes).map_err(|source| ModelLoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        self.load_document(doc, base_dir)
    }

    /// Build a model from an already parsed manifest. Relative paths in the
    /// manifest are resolved against `base_dir`.
    pub fn load_document(
        &self,
        doc: ArtifactDocument,
        base_dir: &Path,
    ) -> Result<LoadedModel, ModelLoadError> {
        let schema = Arc::new(FeatureSchema::from_document(doc.schema)?);

        let (classifier, tree_ensemble): (Arc<dyn Classifier>, Option<Arc<TreeEnsemble>>) =
            match doc.model {
                ModelDocument::TreeEnsemble(ensemble) => {
                    let ensemble = Arc::new(TreeEnsemble::from_document(ensemble, schema.names())?);
                    let classifier: Arc<dyn Classifier> = ensemble.clone();
                    (classifier, Some(ensemble))
                }
                ModelDocument::Onnx { path } => {
                    (self.load_onnx(&base_dir.join(path), schema.names())?, None)
                }
            };

        let explainer = build_explainer(
            doc.explainer,
            &schema,
            classifier.clone(),
            tree_ensemble,
        );

        match &explainer {
            Ok(engine) => info!(
                model = %doc.name,
                backend = classifier.backend(),
                explainer = engine.name(),
                schema_version = %schema.version(),
                features = schema.len(),
                "Model loaded successfully"
            ),
            Err(e) => warn!(
                model = %doc.name,
                backend = classifier.backend(),
                schema_version = %schema.version(),
                reason = %e.reason,
                "Model loaded without an attribution engine; decisions will not be explained"
            ),
        }

        Ok(LoadedModel {
            name: doc.name,
            schema,
            classifier,
            explainer,
        })
    }

    #[cfg(feature = "onnx")]
    fn load_onnx(
        &self,
        path: &Path,
        feature_names: &[String],
    ) -> Result<Arc<dyn Classifier>, ModelLoadError> {
        let model = super::onnx::OnnxClassifier::load(path, feature_names, self.onnx_threads)?;
        Ok(Arc::new(model))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx(
        &self,
        path: &Path,
        _feature_names: &[String],
    ) -> Result<Arc<dyn Classifier>, ModelLoadError> {
        warn!(
            path = %path.display(),
            threads = self.onnx_threads,
            "ONNX artifact requested but the onnx feature is disabled"
        );
        Err(ModelLoadError::UnsupportedBackend("onnx".to_string()))
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn build_explainer(
    doc: Option<ExplainerDocument>,
    schema: &FeatureSchema,
    classifier: Arc<dyn Classifier>,
    tree_ensemble: Option<Arc<TreeEnsemble>>,
) -> Result<Box<dyn Explainer>, ExplanationUnavailable> {
    let doc = doc.unwrap_or(if tree_ensemble.is_some() {
        ExplainerDocument::Tree
    } else {
        ExplainerDocument::ExactShapley {
            background: Vec::new(),
        }
    });

    match doc {
        ExplainerDocument::Tree => {
            let ensemble = tree_ensemble.ok_or_else(|| {
                ExplanationUnavailable::new("tree explainer requires a tree ensemble model")
            })?;
            Ok(Box::new(TreeExplainer::new(ensemble)?))
        }
        ExplainerDocument::ExactShapley { background } => {
            let rows = background
                .iter()
                .enumerate()
                .map(|(i, row)| background_row(schema, i, row))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Box::new(ExactShapleyExplainer::new(classifier, rows)?))
        }
    }
}

/// Lay a named background row out in training order.
fn background_row(
    schema: &FeatureSchema,
    index: usize,
    row: &BTreeMap<String, f64>,
) -> Result<Vec<f64>, ExplanationUnavailable> {
    if let Some(extra) = row.keys().find(|k| schema.position(k).is_none()) {
        return Err(ExplanationUnavailable::new(format!(
            "background row {} has unknown feature `{}`",
            index, extra
        )));
    }
    schema
        .names()
        .iter()
        .map(|name| {
            row.get(name).copied().ok_or_else(|| {
                ExplanationUnavailable::new(format!(
                    "background row {} is missing feature `{}`",
                    index, name
                ))
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// Eight-feature artifact with a small boosted ensemble.
    pub(crate) const ARTIFACT: &str = r#"{
        "name": "loan-approval-xgb",
        "schema": {
            "version": "loan-v2",
            "features": [
                "no_of_dependents", "education", "self_employed", "loan_term",
                "cibil_score", "residential_assets_value", "commercial_assets_value",
                "bank_asset_value"
            ],
            "encodings": {
                "education": {"Graduate": 1, "Not Graduate": 0},
                "self_employed": {"Yes": 1, "No": 0}
            }
        },
        "model": {
            "type": "tree_ensemble",
            "objective": "binary:logistic",
            "base_score": 0.2,
            "trees": [
                {"nodes": [
                    {"feature": "cibil_score", "threshold": 550, "left": 1, "right": 2, "cover": 1000},
                    {"leaf": -2.1, "cover": 380},
                    {"leaf": 1.6, "cover": 620}
                ]},
                {"nodes": [
                    {"feature": "loan_term", "threshold": 96, "left": 1, "right": 2, "cover": 1000},
                    {"feature": "bank_asset_value", "threshold": 50000, "left": 3, "right": 4, "cover": 300},
                    {"leaf": -0.15, "cover": 700},
                    {"leaf": 0.1, "cover": 120},
                    {"leaf": 0.45, "cover": 180}
                ]},
                {"nodes": [
                    {"feature": "residential_assets_value", "threshold": 250000, "left": 1, "right": 2, "cover": 1000},
                    {"feature": "no_of_dependents", "threshold": 3, "left": 3, "right": 4, "cover": 400},
                    {"leaf": 0.12, "cover": 600},
                    {"leaf": -0.05, "cover": 250},
                    {"leaf": -0.2, "cover": 150}
                ]}
            ]
        }
    }"#;

    pub(crate) fn artifact_document() -> ArtifactDocument {
        serde_json::from_str(ARTIFACT).unwrap()
    }

    #[test]
    fn test_load_tree_artifact_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ARTIFACT.as_bytes()).unwrap();

        let model = ModelLoader::new().load_artifact(file.path()).unwrap();

        assert_eq!(model.name, "loan-approval-xgb");
        assert_eq!(model.schema.len(), 8);
        assert_eq!(model.classifier.backend(), "tree_ensemble");
        assert_eq!(model.classifier.feature_names(), model.schema.names());
        assert_eq!(model.explainer.as_ref().map(|e| e.name()).ok(), Some("tree_shap"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ModelLoader::new().load_artifact(dir.path().join("absent.json"));

        assert!(matches!(result, Err(ModelLoadError::Io { .. })));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"name\": ").unwrap();

        let result = ModelLoader::new().load_artifact(file.path());
        assert!(matches!(result, Err(ModelLoadError::Parse { .. })));
    }

    #[test]
    fn test_exact_shapley_background_is_laid_out_in_schema_order() {
        let mut doc = artifact_document();
        let mut row = BTreeMap::new();
        for (i, name) in doc.schema.features.iter().enumerate() {
            row.insert(name.clone(), i as f64);
        }
        doc.explainer = Some(ExplainerDocument::ExactShapley {
            background: vec![row.clone()],
        });

        let schema = FeatureSchema::from_document(doc.schema.clone()).unwrap();
        assert_eq!(
            background_row(&schema, 0, &row).unwrap(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]
        );

        let model = ModelLoader::new().load_document(doc, Path::new(".")).unwrap();
        assert_eq!(
            model.explainer.as_ref().map(|e| e.name()).ok(),
            Some("exact_shapley")
        );
    }

    #[test]
    fn test_explainer_failure_does_not_fail_load() {
        let mut doc = artifact_document();
        doc.explainer = Some(ExplainerDocument::ExactShapley {
            background: Vec::new(),
        });

        let model = ModelLoader::new().load_document(doc, Path::new(".")).unwrap();
        assert!(model.explainer.is_err());
    }

    #[test]
    fn test_background_with_missing_feature_fails_explainer_only() {
        let mut doc = artifact_document();
        doc.explainer = Some(ExplainerDocument::ExactShapley {
            background: vec![BTreeMap::from([("cibil_score".to_string(), 650.0)])],
        });

        let model = ModelLoader::new().load_document(doc, Path::new(".")).unwrap();
        let reason = model.explainer.err().unwrap().reason;
        assert!(reason.contains("missing feature"));
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_onnx_without_feature_is_unsupported() {
        let mut doc = artifact_document();
        doc.model = ModelDocument::Onnx {
            path: PathBuf::from("loan_model.onnx"),
        };

        let result = ModelLoader::new().load_document(doc, Path::new("."));
        assert!(matches!(result, Err(ModelLoadError::UnsupportedBackend(_))));
    }
}
