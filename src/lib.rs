//! Loan Approval Decision Core
//!
//! Encodes loan applicants against the feature schema shipped with a trained
//! model artifact, scores them with the model and attributes each score to
//! its features with SHAP values.

pub mod config;
pub mod error;
pub mod explain;
pub mod feature_encoder;
pub mod metrics;
pub mod models;
pub mod render;
pub mod schema;
pub mod serve;
pub mod types;

pub use config::AppConfig;
pub use error::{ExplanationUnavailable, ModelLoadError, RequestError};
pub use feature_encoder::{FeatureEncoder, FeatureVector};
pub use models::inference::{DecisionService, ServiceBuilder};
pub use types::{ApplicantInput, Attribution, Decision, PredictionReport, Verdict};
