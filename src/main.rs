//! Loan Approval Service - Main Entry Point
//!
//! Reads one applicant JSON object per stdin line, decides and explains it,
//! and writes one report per line to stdout. Logs go to stderr.

use anyhow::{Context, Result};
use loan_approval::{
    config::{AppConfig, LoggingConfig},
    metrics::{DecisionMetrics, MetricsReporter},
    serve, ServiceBuilder,
};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Loan Approval Service");
    info!(
        artifact = %config.model.artifact_path,
        approval_threshold = config.decision.approval_threshold,
        output = ?config.output.format,
        "Configuration loaded"
    );

    let service = ServiceBuilder::new()
        .approval_threshold(config.decision.approval_threshold)
        .onnx_threads(config.model.onnx_threads)
        .load(&config.model.artifact_path)
        .map_err(|e| {
            error!(error = %e, "Failed to load model artifact");
            e
        })
        .with_context(|| format!("Failed to load model from {}", config.model.artifact_path))?;

    info!(
        model = %service.model_name(),
        features = service.encoder().feature_count(),
        explanations = service.explanations_available(),
        "Model loaded"
    );
    if !service.explanations_available() {
        warn!("Explainer unavailable, reports will carry decisions only");
    }

    let metrics = Arc::new(DecisionMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let stdin = BufReader::new(tokio::io::stdin());
    serve::run(&service, &metrics, &config, stdin, tokio::io::stdout()).await?;

    info!("Input closed, shutting down");
    metrics.print_summary();

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("loan_approval={}", logging.level).parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
