use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::data::model::{Dataset, Record};

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// All records sharing one identifier, in file order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub vdid: String,
    pub records: Vec<Record>,
}

/// An inclusive run of sequence numbers nobody uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequenceGap {
    pub start: u64,
    pub end: u64,
}

impl SequenceGap {
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Consistency problems found in the identifiers of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationFindings {
    pub duplicates: Vec<DuplicateGroup>,
    pub gaps: Vec<SequenceGap>,
    /// Highest sequence number seen, `None` when no identifier had one.
    pub max_sequence: Option<u64>,
    /// Identifiers skipped by the gap check because they lack a numeric suffix.
    pub unsequenced: Vec<String>,
}

impl ValidationFindings {
    /// Total count of missing sequence numbers.
    pub fn missing_count(&self) -> u64 {
        self.gaps.iter().map(SequenceGap::size).sum()
    }

    /// Missing sequence numbers in ascending order.
    pub fn missing_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.gaps.iter().flat_map(|g| g.start..=g.end)
    }
}

/// Run every identifier check over the dataset.
pub fn validate(dataset: &Dataset) -> ValidationFindings {
    let duplicates = find_duplicates(&dataset.records);
    let (gaps, max_sequence, unsequenced) = find_sequence_gaps(&dataset.records);
    log::info!(
        "{} duplicate groups, {} gaps, {} identifiers without sequence number",
        duplicates.len(),
        gaps.len(),
        unsequenced.len()
    );
    ValidationFindings {
        duplicates,
        gaps,
        max_sequence,
        unsequenced,
    }
}

// ---------------------------------------------------------------------------
// Duplicates
// ---------------------------------------------------------------------------

/// Groups of records whose identifier occurs more than once, ordered by the
/// first occurrence of each identifier.
pub fn find_duplicates(records: &[Record]) -> Vec<DuplicateGroup> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&Record>> = HashMap::new();

    for rec in records {
        let entry = groups.entry(rec.vdid.as_str()).or_default();
        if entry.is_empty() {
            order.push(rec.vdid.as_str());
        }
        entry.push(rec);
    }

    order
        .into_iter()
        .filter_map(|id| {
            let members = groups.remove(id)?;
            (members.len() > 1).then(|| DuplicateGroup {
                vdid: id.to_string(),
                records: members.into_iter().cloned().collect(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Sequence gaps
// ---------------------------------------------------------------------------

fn suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([0-9]+)$").expect("static pattern compiles"))
}

/// The numeric suffix of an identifier: `VD1` → 1, `VD-N1-0012` → 12.
/// `None` when the identifier does not end in digits or the number overflows.
pub fn sequence_number(vdid: &str) -> Option<u64> {
    suffix_pattern()
        .captures(vdid.trim())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Every number in `1..=max` not used as a suffix, as ascending runs.
/// Also returns the maximum and the identifiers that had no suffix.
pub fn find_sequence_gaps(records: &[Record]) -> (Vec<SequenceGap>, Option<u64>, Vec<String>) {
    let mut seen = BTreeSet::new();
    let mut unsequenced = Vec::new();

    for rec in records {
        match sequence_number(&rec.vdid) {
            Some(n) => {
                seen.insert(n);
            }
            None => {
                log::warn!("identifier '{}' has no numeric suffix, skipped in gap check", rec.vdid);
                unsequenced.push(rec.vdid.clone());
            }
        }
    }

    let mut gaps = Vec::new();
    let mut expected = 1u64;
    for &n in &seen {
        if n > expected {
            gaps.push(SequenceGap {
                start: expected,
                end: n - 1,
            });
        }
        expected = expected.max(n.saturating_add(1));
    }

    (gaps, seen.last().copied(), unsequenced)
}
