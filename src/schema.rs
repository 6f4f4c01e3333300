//! Training-time feature schema shipped alongside the model artifact.
//!
//! The schema is the authority on feature names, feature order and
//! categorical encoding. Nothing here is derived at runtime: the column order
//! and encoding tables are exactly what the classifier was trained on.

use crate::error::ModelLoadError;
use crate::types::applicant::ApplicantField;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Schema section of the artifact manifest, as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Version tag of the training schema
    pub version: String,
    /// Training column names in training order
    pub features: Vec<String>,
    /// Categorical encoding tables keyed by column name
    #[serde(default)]
    pub encodings: BTreeMap<String, BTreeMap<String, i64>>,
}

/// Fixed lookup table for one categorical column.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingTable {
    levels: BTreeMap<String, f64>,
}

impl EncodingTable {
    pub fn new(levels: BTreeMap<String, i64>) -> Self {
        Self {
            levels: levels
                .into_iter()
                .map(|(level, code)| (level, code as f64))
                .collect(),
        }
    }

    /// Code for a category. Surrounding whitespace is ignored, case is not.
    pub fn encode(&self, level: &str) -> Option<f64> {
        self.levels.get(level.trim()).copied()
    }

    pub fn levels(&self) -> impl Iterator<Item = &str> {
        self.levels.keys().map(String::as_str)
    }
}

/// One column of the feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpec {
    /// Training column name
    pub name: String,
    /// Applicant attribute that feeds the column
    pub field: ApplicantField,
}

/// Validated training schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    version: String,
    features: Vec<FeatureSpec>,
    names: Vec<String>,
    encodings: HashMap<ApplicantField, EncodingTable>,
}

impl FeatureSchema {
    /// Validate a schema document against the known applicant attributes.
    pub fn from_document(doc: SchemaDocument) -> Result<Self, ModelLoadError> {
        if doc.features.is_empty() {
            return Err(ModelLoadError::Invalid(
                "schema declares no features".to_string(),
            ));
        }

        let mut features = Vec::with_capacity(doc.features.len());
        let mut seen_fields = HashSet::new();
        let mut seen_names = HashSet::new();

        for name in &doc.features {
            if !seen_names.insert(name.as_str()) {
                return Err(ModelLoadError::Invalid(format!(
                    "feature `{}` declared twice",
                    name
                )));
            }
            let field = ApplicantField::from_column(name).ok_or_else(|| {
                ModelLoadError::Invalid(format!(
                    "feature `{}` does not map to any applicant attribute",
                    name
                ))
            })?;
            if !seen_fields.insert(field) {
                return Err(ModelLoadError::Invalid(format!(
                    "feature `{}` maps to `{}`, which already feeds another feature",
                    name, field
                )));
            }
            features.push(FeatureSpec {
                name: name.clone(),
                field,
            });
        }

        let mut encodings = HashMap::new();
        for (column, levels) in doc.encodings {
            let spec = features
                .iter()
                .find(|f| f.name == column || f.field.name() == column)
                .ok_or_else(|| {
                    ModelLoadError::Invalid(format!(
                        "encoding table for `{}`, which is not a schema feature",
                        column
                    ))
                })?;
            if !spec.field.is_categorical() {
                return Err(ModelLoadError::Invalid(format!(
                    "encoding table for numeric feature `{}`",
                    column
                )));
            }
            if levels.is_empty() {
                return Err(ModelLoadError::Invalid(format!(
                    "encoding table for `{}` is empty",
                    column
                )));
            }
            encodings.insert(spec.field, EncodingTable::new(levels));
        }

        if let Some(missing) = features
            .iter()
            .find(|f| f.field.is_categorical() && !encodings.contains_key(&f.field))
        {
            return Err(ModelLoadError::Invalid(format!(
                "categorical feature `{}` has no encoding table",
                missing.name
            )));
        }

        let names = features.iter().map(|f| f.name.clone()).collect();

        Ok(Self {
            version: doc.version,
            features,
            names,
            encodings,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    /// Feature names in training order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Position of a feature in the training order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn encoding(&self, field: ApplicantField) -> Option<&EncodingTable> {
        self.encodings.get(&field)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Eight-column schema used by the asset-breakdown model variant.
    pub(crate) fn asset_breakdown_document() -> SchemaDocument {
        serde_json::from_str(
            r#"{
                "version": "loan-v2",
                "features": [
                    "no_of_dependents",
                    "education",
                    "self_employed",
                    "loan_term",
                    "cibil_score",
                    "residential_assets_value",
                    "commercial_assets_value",
                    "bank_asset_value"
                ],
                "encodings": {
                    "education": {"Graduate": 1, "Not Graduate": 0},
                    "self_employed": {"Yes": 1, "No": 0}
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_schema_preserves_training_order() {
        let schema = FeatureSchema::from_document(asset_breakdown_document()).unwrap();

        assert_eq!(schema.version(), "loan-v2");
        assert_eq!(schema.len(), 8);
        assert_eq!(schema.names()[0], "no_of_dependents");
        assert_eq!(schema.names()[4], "cibil_score");
        assert_eq!(schema.position("bank_asset_value"), Some(7));
        assert_eq!(
            schema.features()[4].field,
            ApplicantField::CreditScore
        );
    }

    #[test]
    fn test_encoding_lookup() {
        let schema = FeatureSchema::from_document(asset_breakdown_document()).unwrap();
        let education = schema.encoding(ApplicantField::Education).unwrap();

        assert_eq!(education.encode("Graduate"), Some(1.0));
        assert_eq!(education.encode(" Not Graduate "), Some(0.0));
        assert_eq!(education.encode("graduate"), None);
        assert_eq!(education.levels().count(), 2);
    }

    #[test]
    fn test_categorical_without_table_is_rejected() {
        let mut doc = asset_breakdown_document();
        doc.encodings.remove("self_employed");

        let err = FeatureSchema::from_document(doc).unwrap_err();
        assert!(err.to_string().contains("self_employed"));
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let mut doc = asset_breakdown_document();
        doc.features.push("favourite_colour".to_string());

        assert!(FeatureSchema::from_document(doc).is_err());
    }

    #[test]
    fn test_duplicate_feature_is_rejected() {
        let mut doc = asset_breakdown_document();
        doc.features.push("credit_score".to_string());

        let err = FeatureSchema::from_document(doc).unwrap_err();
        assert!(err.to_string().contains("credit_score"));
    }

    #[test]
    fn test_encoding_for_numeric_feature_is_rejected() {
        let mut doc = asset_breakdown_document();
        doc.encodings
            .insert("loan_term".to_string(), BTreeMap::from([("long".to_string(), 1)]));

        assert!(FeatureSchema::from_document(doc).is_err());
    }
}
