//! Error taxonomy for the decision core

use std::path::PathBuf;
use thiserror::Error;

/// A single request that cannot be answered.
///
/// Returned to the caller as a rejected request; never fatal to the process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// Input does not fit the model's feature contract (missing field,
    /// unknown category, wrong feature names or order).
    #[error("schema mismatch on `{field}`: {detail}")]
    SchemaMismatch { field: String, detail: String },

    /// Out-of-range or malformed raw input.
    #[error("invalid value for `{field}`: {detail}")]
    Input { field: String, detail: String },

    /// The classifier backend failed while scoring this request.
    #[error("scoring failed: {0}")]
    Scoring(String),
}

impl RequestError {
    pub fn schema_mismatch(field: impl Into<String>, detail: impl Into<String>) -> Self {
        RequestError::SchemaMismatch {
            field: field.into(),
            detail: detail.into(),
        }
    }

    pub fn input(field: impl Into<String>, detail: impl Into<String>) -> Self {
        RequestError::Input {
            field: field.into(),
            detail: detail.into(),
        }
    }

    /// Field that failed validation, if the error is tied to one.
    pub fn field(&self) -> Option<&str> {
        match self {
            RequestError::SchemaMismatch { field, .. } | RequestError::Input { field, .. } => {
                Some(field)
            }
            RequestError::Scoring(_) => None,
        }
    }

    /// Short machine-readable kind, used for metrics and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::SchemaMismatch { .. } => "schema_mismatch",
            RequestError::Input { .. } => "input_error",
            RequestError::Scoring(_) => "scoring_error",
        }
    }
}

/// The model artifact could not be loaded. Fatal at startup.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Artifact parsed but is internally inconsistent.
    #[error("invalid model artifact: {0}")]
    Invalid(String),

    #[error("unsupported model backend `{0}` (rebuild with the matching cargo feature)")]
    UnsupportedBackend(String),

    #[cfg(feature = "onnx")]
    #[error("ONNX runtime error: {0}")]
    Onnx(String),
}

/// The attribution engine could not produce an explanation.
///
/// Never fatal: the decision is still returned, without the explanation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("explanation unavailable: {reason}")]
pub struct ExplanationUnavailable {
    pub reason: String,
}

impl ExplanationUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
