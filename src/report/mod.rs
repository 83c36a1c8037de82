//! Turning an [`Analysis`] into output: console text, JSON, or a
//! model-written report.

pub mod llm;
pub mod prompt;

use std::fmt::Write as _;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::data::model::{ColumnType, RowIssue};
use crate::error::Result;
use crate::state::Analysis;
use crate::validate::ValidationFindings;

use self::llm::TextGenerator;

// ---------------------------------------------------------------------------
// Console text
// ---------------------------------------------------------------------------

/// Human-readable summary: load statistics, identifier findings, and the
/// anomalous devices.
pub fn render_console(analysis: &Analysis, max_listed: usize) -> String {
    let mut out = String::new();
    let ds = &analysis.dataset;
    let findings = &analysis.findings;

    let _ = writeln!(
        out,
        "Loaded {} rows from {} ({} usable, {} dropped for missing or invalid coordinates).",
        analysis.rows_loaded,
        analysis.source.display(),
        ds.len(),
        ds.dropped.len()
    );
    for issue in ds.dropped.iter().take(max_listed) {
        let _ = writeln!(out, "  dropped {issue}");
    }

    out.push('\n');
    if findings.duplicates.is_empty() {
        out.push_str("No duplicate device IDs.\n");
    } else {
        let _ = writeln!(out, "Duplicate device IDs ({} groups):", findings.duplicates.len());
        for g in findings.duplicates.iter().take(max_listed) {
            let rows: Vec<String> = g.records.iter().map(|r| r.row.to_string()).collect();
            let _ = writeln!(out, "  {}: rows {}", g.vdid, rows.join(", "));
        }
    }

    if findings.gaps.is_empty() {
        out.push_str("No missing ID sequence numbers.\n");
    } else {
        let listed: Vec<String> = findings
            .missing_numbers()
            .take(max_listed)
            .map(|n| n.to_string())
            .collect();
        let total = findings.missing_count();
        let more = if total > listed.len() as u64 { ", ..." } else { "" };
        let _ = writeln!(
            out,
            "Missing ID sequence numbers ({total}): {}{more}",
            listed.join(", ")
        );
    }
    if !findings.unsequenced.is_empty() {
        let _ = writeln!(
            out,
            "IDs without a numeric suffix ({}): {}",
            findings.unsequenced.len(),
            findings
                .unsequenced
                .iter()
                .take(max_listed)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    out.push('\n');
    let outliers = analysis.detection.outliers(ds);
    if ds.is_empty() {
        out.push_str("No devices with usable coordinates; outlier detection skipped.\n");
    } else if outliers.is_empty() {
        out.push_str("No anomalous devices detected.\n");
    } else {
        out.push_str("Anomalous devices detected:\n");
        for (rec, score) in outliers {
            let _ = writeln!(
                out,
                "Device ID: {}, longitude: {}, latitude: {} (score {score:.3})",
                rec.vdid, rec.lon, rec.lat
            );
        }
    }
    out
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct OutlierEntry<'a> {
    row: usize,
    vdid: &'a str,
    lon: f64,
    lat: f64,
    score: f64,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    source: String,
    analysed_at: DateTime<Local>,
    rows_loaded: usize,
    rows_used: usize,
    dropped: &'a [RowIssue],
    column_types: &'a [(String, ColumnType)],
    null_counts: &'a [(String, usize)],
    findings: &'a ValidationFindings,
    missing_count: u64,
    threshold: f64,
    outliers: Vec<OutlierEntry<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a str>,
}

/// The whole analysis as pretty-printed JSON, with the prompt and the
/// generated report when there are any.
pub fn render_json(
    analysis: &Analysis,
    prompt: Option<&str>,
    report: Option<&str>,
) -> serde_json::Result<String> {
    let outliers = analysis
        .detection
        .outliers(&analysis.dataset)
        .into_iter()
        .map(|(rec, score)| OutlierEntry {
            row: rec.row,
            vdid: &rec.vdid,
            lon: rec.lon,
            lat: rec.lat,
            score,
        })
        .collect();
    let doc = JsonReport {
        source: analysis.source.display().to_string(),
        analysed_at: analysis.analysed_at,
        rows_loaded: analysis.rows_loaded,
        rows_used: analysis.dataset.len(),
        dropped: &analysis.dataset.dropped,
        column_types: &analysis.column_types,
        null_counts: &analysis.null_counts,
        findings: &analysis.findings,
        missing_count: analysis.findings.missing_count(),
        threshold: analysis.detection.threshold,
        outliers,
        prompt,
        report,
    };
    serde_json::to_string_pretty(&doc)
}

// ---------------------------------------------------------------------------
// Generated report
// ---------------------------------------------------------------------------

/// Build the prompt for `analysis` and have `generator` write the report.
pub fn generate_report(
    analysis: &Analysis,
    generator: &dyn TextGenerator,
    max_listed: usize,
) -> Result<String> {
    let prompt = prompt::build_prompt(analysis, max_listed);
    log::debug!("prompt:\n{prompt}");
    generator.generate(&prompt)
}
