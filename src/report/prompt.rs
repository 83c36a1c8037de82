use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::state::Analysis;

/// Prompt sent to the text-generation service. `{name}` placeholders are
/// filled by [`render`].
pub const REPORT_TEMPLATE: &str = "\
You are a data-quality analyst for a highway traffic agency. Below is an
automated check of a vehicle-detector (VD) device table. Write a short report
in plain prose: summarise the state of the data, explain each problem found,
and recommend concrete follow-up actions. Do not invent numbers that are not
listed here.

Data source: {source}
Analysis date: {date}
Rows loaded: {rows_loaded}
Rows with usable coordinates: {rows_used}

Column types:
{column_types}

Missing values per column (total {missing_total}):
{missing_values}

Duplicate device IDs:
{duplicates}

Missing ID sequence numbers:
{gaps}

Devices with anomalous positions (isolation forest):
{outliers}
";

fn placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern compiles")
    })
}

/// Substitute `{name}` placeholders with their values in one pass.
/// Placeholders without a value are left as they are.
pub fn render(template: &str, vars: &[(&str, String)]) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            match vars.iter().find(|(k, _)| *k == name) {
                Some((_, v)) => Cow::Borrowed(v.as_str()),
                None => Cow::Owned(caps[0].to_string()),
            }
        })
        .into_owned()
}

/// Fill [`REPORT_TEMPLATE`] from an analysis. Lists longer than
/// `max_listed` are cut short with a count of the rest.
pub fn build_prompt(analysis: &Analysis, max_listed: usize) -> String {
    let column_types = analysis
        .column_types
        .iter()
        .map(|(name, ty)| format!("- {name}: {ty}"))
        .collect::<Vec<_>>()
        .join("\n");

    let missing_values = analysis
        .null_counts
        .iter()
        .map(|(name, n)| format!("- {name}: {n}"))
        .collect::<Vec<_>>()
        .join("\n");

    let vars = [
        ("source", analysis.source.display().to_string()),
        ("date", analysis.analysed_at.format("%Y-%m-%d").to_string()),
        ("rows_loaded", analysis.rows_loaded.to_string()),
        ("rows_used", analysis.dataset.len().to_string()),
        ("column_types", column_types),
        ("missing_total", analysis.total_nulls().to_string()),
        ("missing_values", missing_values),
        ("duplicates", duplicates_text(analysis, max_listed)),
        ("gaps", gaps_text(analysis, max_listed)),
        ("outliers", outliers_text(analysis, max_listed)),
    ];
    render(REPORT_TEMPLATE, &vars)
}

fn duplicates_text(analysis: &Analysis, max_listed: usize) -> String {
    let groups = &analysis.findings.duplicates;
    if groups.is_empty() {
        return "none".to_string();
    }
    let mut out = String::new();
    for g in groups.iter().take(max_listed) {
        let rows: Vec<String> = g.records.iter().map(|r| r.row.to_string()).collect();
        let _ = writeln!(out, "- {} appears {} times (rows {})", g.vdid, g.records.len(), rows.join(", "));
    }
    if groups.len() > max_listed {
        let _ = writeln!(out, "- ... and {} more", groups.len() - max_listed);
    }
    out.trim_end().to_string()
}

fn gaps_text(analysis: &Analysis, max_listed: usize) -> String {
    let findings = &analysis.findings;
    let mut out = match findings.max_sequence {
        None => "no identifier carries a sequence number".to_string(),
        Some(_) if findings.gaps.is_empty() => "none".to_string(),
        Some(max) => {
            let listed: Vec<String> = findings
                .missing_numbers()
                .take(max_listed)
                .map(|n| n.to_string())
                .collect();
            let total = findings.missing_count();
            let more = if total > listed.len() as u64 { ", ..." } else { "" };
            format!("{total} of 1..{max} missing: {}{more}", listed.join(", "))
        }
    };
    if !findings.unsequenced.is_empty() {
        let _ = write!(
            out,
            "\n{} identifier(s) without a numeric suffix were skipped: {}",
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
    out
}

fn outliers_text(analysis: &Analysis, max_listed: usize) -> String {
    let outliers = analysis.detection.outliers(&analysis.dataset);
    if outliers.is_empty() {
        return "none".to_string();
    }
    let mut out = String::new();
    for (rec, score) in outliers.iter().take(max_listed) {
        let _ = writeln!(
            out,
            "- {} at longitude {}, latitude {} (score {score:.3})",
            rec.vdid, rec.lon, rec.lat
        );
    }
    if outliers.len() > max_listed {
        let _ = writeln!(out, "- ... and {} more", outliers.len() - max_listed);
    }
    out.trim_end().to_string()
}
