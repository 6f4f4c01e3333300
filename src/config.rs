//! Configuration management for the loan approval service

use crate::models::inference::DEFAULT_APPROVAL_THRESHOLD;
use crate::render::DEFAULT_MAX_DISPLAY;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "LOAN_APPROVAL_CONFIG";

/// Prefix for per-key overrides, e.g. `LOAN_APPROVAL__DECISION__APPROVAL_THRESHOLD`
pub const ENV_PREFIX: &str = "LOAN_APPROVAL";

/// Report format written to stdout
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON report per line
    #[default]
    Json,
    /// Verdict message and contribution chart
    Pretty,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub decision: DecisionConfig,
    pub output: OutputConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the JSON model artifact
    pub artifact_path: String,
    /// Number of threads for ONNX inference (default: 1)
    pub onnx_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_path: "models/loan_model.json".to_string(),
            onnx_threads: 1,
        }
    }
}

/// Decision configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// P(approve) at or above which a loan is approved
    pub approval_threshold: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            approval_threshold: DEFAULT_APPROVAL_THRESHOLD,
        }
    }
}

/// Report output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Rows in the contribution chart (pretty format only)
    pub max_display: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Json,
            max_display: DEFAULT_MAX_DISPLAY,
        }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between periodic summaries, 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `LOAN_APPROVAL_CONFIG` or the default path,
    /// then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, then apply environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to build configuration from {}", path.display()))?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.model.artifact_path, "models/loan_model.json");
        assert_eq!(config.decision.approval_threshold, 0.5);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.max_display, 6);
        assert_eq!(config.metrics.report_interval_secs, 0);
    }

    #[test]
    fn test_load_from_path() {
        let file = write_config(
            r#"
            [model]
            artifact_path = "artifacts/model.json"

            [decision]
            approval_threshold = 0.65

            [output]
            format = "pretty"
            max_display = 4

            [logging]
            level = "debug"
            format = "json"
            "#,
        );

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.model.artifact_path, "artifacts/model.json");
        assert_eq!(config.model.onnx_threads, 1);
        assert_eq!(config.decision.approval_threshold, 0.65);
        assert_eq!(config.output.format, OutputFormat::Pretty);
        assert_eq!(config.output.max_display, 4);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config("[metrics]\nreport_interval_secs = 30\n");

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.metrics.report_interval_secs, 30);
        assert_eq!(config.decision.approval_threshold, DEFAULT_APPROVAL_THRESHOLD);
        assert_eq!(config.output.max_display, DEFAULT_MAX_DISPLAY);
    }

    #[test]
    fn test_shipped_config_matches_default() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let shipped = AppConfig::load_from_path(path).unwrap();
        let default = AppConfig::default();

        assert_eq!(shipped.model.artifact_path, default.model.artifact_path);
        assert_eq!(shipped.decision.approval_threshold, default.decision.approval_threshold);
        assert_eq!(shipped.output.format, default.output.format);
        assert_eq!(shipped.output.max_display, default.output.max_display);
        assert_eq!(shipped.logging.format, default.logging.format);
    }

    #[test]
    fn test_unknown_output_format_fails() {
        let file = write_config("[output]\nformat = \"xml\"\n");
        assert!(AppConfig::load_from_path(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load_from_path(dir.path().join("absent.toml")).is_err());
    }
}
