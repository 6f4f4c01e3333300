//! Text rendering of decisions and attributions for terminal output

use crate::error::RequestError;
use crate::models::Objective;
use crate::types::decision::{Attribution, Decision, PredictionReport};

/// Rows shown in the contribution chart unless configured otherwise.
pub const DEFAULT_MAX_DISPLAY: usize = 6;

const BAR_WIDTH: usize = 30;

/// One line stating the verdict, with P(approve) when the model exposes it.
pub fn verdict_message(decision: &Decision) -> String {
    match decision.probability {
        Some(p) => format!(
            "The loan is likely to be: {} (P(approve) = {:.1}%)",
            decision.verdict,
            p.approve * 100.0
        ),
        None => format!("The loan is likely to be: {}", decision.verdict),
    }
}

/// Ranked horizontal bar chart of feature contributions.
///
/// Features are ordered by absolute contribution. When there are more than
/// `max_display` features, the smallest ones are folded into a final
/// "Sum of N other features" row.
pub fn contribution_chart(attribution: &Attribution, max_display: usize) -> String {
    let max_display = max_display.max(1);
    let ranked = attribution.ranked();

    let mut rows: Vec<(String, f64)> = Vec::with_capacity(max_display);
    if ranked.len() <= max_display {
        rows.extend(
            ranked
                .iter()
                .map(|c| (format!("{} = {}", c.feature, format_value(c.value)), c.contribution)),
        );
    } else {
        let shown = max_display - 1;
        rows.extend(
            ranked[..shown]
                .iter()
                .map(|c| (format!("{} = {}", c.feature, format_value(c.value)), c.contribution)),
        );
        let rest = &ranked[shown..];
        rows.push((
            format!("Sum of {} other features", rest.len()),
            rest.iter().map(|c| c.contribution).sum(),
        ));
    }

    let label_width = rows.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);
    let scale = rows
        .iter()
        .map(|(_, v)| v.abs())
        .fold(0.0_f64, f64::max);

    let mut out = String::new();
    for (label, value) in &rows {
        let len = if scale > 0.0 {
            ((value.abs() / scale) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        let glyph = if *value >= 0.0 { "█" } else { "░" };
        out.push_str(&format!(
            "{:>width$} {:+10.4} {}\n",
            label,
            value,
            glyph.repeat(len),
            width = label_width
        ));
    }
    out.push_str(&format!(
        "{:>width$} {:+10.4} (model output {:+.4})\n",
        "baseline",
        attribution.baseline,
        attribution.raw_output,
        width = label_width
    ));
    out
}

/// Full human-readable report. Contributions are labelled in the unit of
/// the model's raw output.
pub fn render_report(report: &PredictionReport, objective: Objective, max_display: usize) -> String {
    let mut out = format!(
        "Prediction result [{}]\n{}\n",
        report.request_id,
        verdict_message(&report.decision)
    );

    match (&report.attribution, &report.explanation_notice) {
        (Some(attribution), _) => {
            out.push_str(&format!(
                "Feature impact (SHAP values, {}):\n",
                objective.output_unit()
            ));
            out.push_str(&contribution_chart(attribution, max_display));
        }
        (None, Some(notice)) => {
            out.push_str(notice);
            out.push('\n');
        }
        (None, None) => {}
    }
    out
}

/// Message for a request refused before a decision.
pub fn error_message(error: &RequestError) -> String {
    format!("Request rejected: {}", error)
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}
