//! Line-oriented request loop
//!
//! One applicant JSON object per input line, one report or refusal per
//! output line. A bad line never ends the loop.

use crate::config::{AppConfig, OutputFormat};
use crate::metrics::{DecisionMetrics, MALFORMED_REQUEST};
use crate::models::inference::DecisionService;
use crate::render;
use crate::types::applicant::ApplicantInput;
use anyhow::{Context, Result};
use serde_json::json;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Answer every line of `reader` on `writer` until end of input.
///
/// Lines are read as raw bytes, so a line that is not valid UTF-8 is
/// answered as a malformed request like any other unparsable line.
pub async fn run<R, W>(
    service: &DecisionService,
    metrics: &DecisionMetrics,
    config: &AppConfig,
    mut reader: R,
    mut writer: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .context("Failed to read input")?;
        if read == 0 {
            break;
        }

        let start_time = Instant::now();
        let output = match std::str::from_utf8(&buf) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                process_line(service, metrics, line, config)?
            }
            Err(e) => {
                metrics.record_malformed(start_time.elapsed());
                warn!(error = %e, "Input line is not valid UTF-8");
                malformed(config, &format!("line is not valid UTF-8: {}", e))
            }
        };

        writer.write_all(output.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Decide one input line and render its output line.
pub fn process_line(
    service: &DecisionService,
    metrics: &DecisionMetrics,
    line: &str,
    config: &AppConfig,
) -> Result<String> {
    let start_time = Instant::now();

    let input = match serde_json::from_str::<ApplicantInput>(line) {
        Ok(input) => input,
        Err(e) => {
            metrics.record_malformed(start_time.elapsed());
            warn!(error = %e, "Malformed applicant line");
            return Ok(malformed(config, &e.to_string()));
        }
    };

    match service.evaluate(&input) {
        Ok(report) => {
            metrics.record_decision(&report, start_time.elapsed());
            debug!(
                request_id = %report.request_id,
                verdict = %report.verdict(),
                explained = report.attribution.is_some(),
                "Decision made"
            );

            match config.output.format {
                OutputFormat::Json => {
                    serde_json::to_string(&report).context("Failed to serialize report")
                }
                OutputFormat::Pretty => Ok(render::render_report(
                    &report,
                    service.objective(),
                    config.output.max_display,
                )),
            }
        }
        Err(e) => {
            metrics.record_refusal(&e, start_time.elapsed());
            warn!(kind = e.kind(), field = ?e.field(), error = %e, "Request rejected");

            Ok(match config.output.format {
                OutputFormat::Json => json!({
                    "status": "rejected_request",
                    "error": e.kind(),
                    "field": e.field(),
                    "message": e.to_string(),
                })
                .to_string(),
                OutputFormat::Pretty => render::error_message(&e),
            })
        }
    }
}

fn malformed(config: &AppConfig, message: &str) -> String {
    match config.output.format {
        OutputFormat::Json => json!({
            "status": "rejected_request",
            "error": MALFORMED_REQUEST,
            "message": message,
        })
        .to_string(),
        OutputFormat::Pretty => format!("Request rejected: malformed applicant ({})", message),
    }
}
