//! Feature encoding for loan approval model inference.
//!
//! This module turns raw applicant input into the feature vector the model
//! was trained on: same column names, same column order, same categorical
//! encoding. Order and encoding come from the artifact's schema, never from
//! the order fields appear in the input record.

use crate::error::RequestError;
use crate::schema::FeatureSchema;
use crate::types::applicant::{ApplicantField, ApplicantInput, FieldKind, RawValue};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;

/// Named, ordered model input.
///
/// Only [`FeatureEncoder::encode`] builds one, so every vector carries the
/// names and order of the schema it was encoded against.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    schema_version: Arc<str>,
    names: Arc<[String]>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a feature by training column name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Same names and order, different values. Used by explainers to build
    /// perturbed rows that stay inside the schema.
    pub(crate) fn with_values(&self, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), self.names.len());
        Self {
            schema_version: self.schema_version.clone(),
            names: self.names.clone(),
            values,
        }
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

/// Encoder that transforms applicant input into model input features.
///
/// Features are produced in the exact order declared by the training schema.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    schema: Arc<FeatureSchema>,
    names: Arc<[String]>,
    version: Arc<str>,
}

impl FeatureEncoder {
    /// Create an encoder bound to a training schema.
    pub fn new(schema: Arc<FeatureSchema>) -> Self {
        let names: Arc<[String]> = schema.names().to_vec().into();
        let version: Arc<str> = schema.version().into();
        Self {
            schema,
            names,
            version,
        }
    }

    /// Encode one applicant record.
    ///
    /// Fails with `SchemaMismatch` when a required attribute is missing or a
    /// category is outside its encoding table, and with `Input` when a number
    /// is out of range. Nothing is zero-filled or defaulted.
    pub fn encode(&self, input: &ApplicantInput) -> Result<FeatureVector, RequestError> {
        let mut values = Vec::with_capacity(self.schema.len());

        for spec in self.schema.features() {
            let raw = input.value(spec.field).ok_or_else(|| {
                RequestError::schema_mismatch(
                    spec.field.name(),
                    format!("required by feature `{}` but missing", spec.name),
                )
            })?;
            values.push(self.encode_value(spec.field, raw)?);
        }

        Ok(FeatureVector {
            schema_version: self.version.clone(),
            names: self.names.clone(),
            values,
        })
    }

    fn encode_value(&self, field: ApplicantField, raw: RawValue<'_>) -> Result<f64, RequestError> {
        match (field.kind(), raw) {
            (FieldKind::Categorical, RawValue::Category(level)) => {
                let table = self.schema.encoding(field).ok_or_else(|| {
                    RequestError::schema_mismatch(field.name(), "no encoding table in schema")
                })?;
                table.encode(level).ok_or_else(|| {
                    let expected: Vec<&str> = table.levels().collect();
                    RequestError::schema_mismatch(
                        field.name(),
                        format!("unknown category `{}`, expected one of {:?}", level, expected),
                    )
                })
            }
            (FieldKind::Integer { min, max }, RawValue::Number(value)) => {
                check_finite(field, value)?;
                if value.fract() != 0.0 {
                    return Err(RequestError::input(
                        field.name(),
                        format!("must be a whole number, got {}", value),
                    ));
                }
                if value < min as f64 {
                    return Err(RequestError::input(
                        field.name(),
                        format!("must be at least {}, got {}", min, value),
                    ));
                }
                if let Some(max) = max {
                    if value > max as f64 {
                        return Err(RequestError::input(
                            field.name(),
                            format!("must be at most {}, got {}", max, value),
                        ));
                    }
                }
                Ok(value)
            }
            (FieldKind::Amount, RawValue::Number(value)) => {
                check_finite(field, value)?;
                if value < 0.0 {
                    return Err(RequestError::input(
                        field.name(),
                        format!("must not be negative, got {}", value),
                    ));
                }
                Ok(value)
            }
            (FieldKind::Categorical, RawValue::Number(_)) => Err(RequestError::schema_mismatch(
                field.name(),
                "expected a category, got a number",
            )),
            (_, RawValue::Category(_)) => Err(RequestError::schema_mismatch(
                field.name(),
                "expected a number, got a category",
            )),
            (_, RawValue::Unsupported(found)) => Err(RequestError::schema_mismatch(
                field.name(),
                format!("expected a number or a category, got {}", found),
            )),
        }
    }

    /// Number of features produced.
    pub fn feature_count(&self) -> usize {
        self.names.len()
    }

    /// Feature names in training order.
    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }
}

fn check_finite(field: ApplicantField, value: f64) -> Result<(), RequestError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RequestError::input(field.name(), "must be a finite number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::asset_breakdown_document;
    use crate::schema::SchemaDocument;

    fn encoder() -> FeatureEncoder {
        let schema = FeatureSchema::from_document(asset_breakdown_document()).unwrap();
        FeatureEncoder::new(Arc::new(schema))
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
    fn test_feature_encoding() {
        let encoder = encoder();
        let vector = encoder.encode(&applicant()).unwrap();

        assert_eq!(vector.len(), encoder.feature_count());
        assert_eq!(vector.names(), encoder.feature_names());
        assert_eq!(vector.schema_version(), "loan-v2");
        assert_eq!(
            vector.values(),
            &[2.0, 1.0, 0.0, 360.0, 750.0, 500_000.0, 0.0, 100_000.0]
        );
        assert_eq!(vector.get("education"), Some(1.0));
        assert_eq!(vector.get("self_employed"), Some(0.0));
    }

    #[test]
    fn test_order_follows_schema_not_input() {
        let mut doc = asset_breakdown_document();
        doc.features.reverse();
        let reversed = FeatureEncoder::new(Arc::new(FeatureSchema::from_document(doc).unwrap()));

        let vector = reversed.encode(&applicant()).unwrap();
        assert_eq!(vector.names()[0], "bank_asset_value");
        assert_eq!(vector.values()[0], 100_000.0);
        assert_eq!(vector.values()[7], 2.0);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let encoder = encoder();
        let input = applicant();

        assert_eq!(encoder.encode(&input).unwrap(), encoder.encode(&input).unwrap());
    }

    #[test]
    fn test_unknown_category_is_schema_mismatch() {
        let mut input = applicant();
        input.education = Some("Unknown".to_string().into());

        let err = encoder().encode(&input).unwrap_err();
        assert!(matches!(err, RequestError::SchemaMismatch { .. }));
        assert_eq!(err.field(), Some("education"));
    }

    #[test]
    fn test_missing_field_is_schema_mismatch() {
        let mut input = applicant();
        input.bank_assets = None;

        let err = encoder().encode(&input).unwrap_err();
        assert!(matches!(err, RequestError::SchemaMismatch { .. }));
        assert_eq!(err.field(), Some("bank_assets"));
    }

    fn parsed_with(key: &str, value: serde_json::Value) -> ApplicantInput {
        let mut json = serde_json::to_value(applicant()).unwrap();
        json[key] = value;
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_number_for_category_names_field() {
        let input = parsed_with("education", serde_json::json!(1));

        let err = encoder().encode(&input).unwrap_err();
        assert!(matches!(err, RequestError::SchemaMismatch { .. }));
        assert_eq!(err.field(), Some("education"));
    }

    #[test]
    fn test_text_for_number_names_field() {
        let input = parsed_with("credit_score", serde_json::json!("750"));

        let err = encoder().encode(&input).unwrap_err();
        assert!(matches!(err, RequestError::SchemaMismatch { .. }));
        assert_eq!(err.field(), Some("credit_score"));
    }

    #[test]
    fn test_boolean_value_names_field() {
        let input = parsed_with("loan_term", serde_json::json!(true));

        let err = encoder().encode(&input).unwrap_err();
        assert_eq!(err.field(), Some("loan_term"));
        assert!(err.to_string().contains("boolean"));
    }

    #[test]
    fn test_fields_outside_schema_are_ignored() {
        let mut input = applicant();
        input.luxury_assets = Some((-5.0).into());

        assert!(encoder().encode(&input).is_ok());
    }

    #[test]
    fn test_out_of_training_range_score_is_accepted() {
        let mut input = applicant();
        input.credit_score = Some(250.0.into());

        let vector = encoder().encode(&input).unwrap();
        assert_eq!(vector.get("cibil_score"), Some(250.0));
    }

    fn assert_input_error(mutate: impl Fn(&mut ApplicantInput), field: &str) {
        let mut input = applicant();
        mutate(&mut input);
        let err = encoder().encode(&input).unwrap_err();
        assert!(matches!(err, RequestError::Input { .. }), "{}: {}", field, err);
        assert_eq!(err.field(), Some(field));
    }

    #[test]
    fn test_range_violations_are_input_errors() {
        assert_input_error(|i| i.credit_score = Some(950.0.into()), "credit_score");
        assert_input_error(|i| i.dependents = Some(1.5.into()), "dependents");
        assert_input_error(|i| i.loan_term = Some(0.0.into()), "loan_term");
        assert_input_error(|i| i.residential_assets = Some((-1.0).into()), "residential_assets");
        assert_input_error(|i| i.bank_assets = Some(f64::NAN.into()), "bank_assets");
    }

    #[test]
    fn test_total_asset_variant() {
        let doc: SchemaDocument = serde_json::from_str(
            r#"{
                "version": "loan-v1",
                "features": ["income_annum", "loan_amount", "cibil_score",
                             "education", "self_employed", "asset_value"],
                "encodings": {
                    "education": {"Graduate": 1, "Not Graduate": 0},
                    "self_employed": {"Yes": 1, "No": 0}
                }
            }"#,
        )
        .unwrap();
        let encoder = FeatureEncoder::new(Arc::new(FeatureSchema::from_document(doc).unwrap()));

        let input = ApplicantInput {
            income_annum: Some(9_600_000.0.into()),
            loan_amount: Some(29_900_000.0.into()),
            credit_score: Some(778.0.into()),
            education: Some("Not Graduate".to_string().into()),
            self_employed: Some("Yes".to_string().into()),
            total_assets: Some(50_700_000.0.into()),
            ..Default::default()
        };

        let vector = encoder.encode(&input).unwrap();
        assert_eq!(
            vector.values(),
            &[9_600_000.0, 29_900_000.0, 778.0, 0.0, 1.0, 50_700_000.0]
        );
    }

    #[test]
    fn test_vector_serializes_as_ordered_map() {
        let vector = encoder().encode(&applicant()).unwrap();
        let json = serde_json::to_string(&vector).unwrap();

        assert!(json.starts_with(r#"{"no_of_dependents":2.0,"education":1.0"#));
    }
}
