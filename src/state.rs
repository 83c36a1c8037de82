use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::config::{Config, DetectorConfig};
use crate::data::filter::build_dataset;
use crate::data::loader::load_file;
use crate::data::model::{ColumnType, Dataset, Table};
use crate::detect::{self, Detection};
use crate::error::Result;
use crate::validate::{validate, ValidationFindings};

// ---------------------------------------------------------------------------
// Analysis state
// ---------------------------------------------------------------------------

/// Everything one run learns about the input, independent of rendering.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Where the table came from.
    pub source: PathBuf,

    /// When the analysis ran.
    pub analysed_at: DateTime<Local>,

    /// Rows in the file before any were dropped.
    pub rows_loaded: usize,

    /// Inferred dtype per column, in header order.
    pub column_types: Vec<(String, ColumnType)>,

    /// Null cells per column, in header order.
    pub null_counts: Vec<(String, usize)>,

    /// Records with usable coordinates, plus the rows that were dropped.
    pub dataset: Dataset,

    /// Duplicate and sequence-gap findings.
    pub findings: ValidationFindings,

    /// Outlier scores and labels, aligned with `dataset.records`.
    pub detection: Detection,
}

impl Analysis {
    /// Load, validate, and score the configured input file.
    pub fn run(config: &Config) -> Result<Self> {
        let table = load_file(&config.input)?;
        Self::from_table(&config.input, &table, &config.detector, Local::now())
    }

    /// Run the pipeline over an already loaded table.
    pub fn from_table(
        source: &Path,
        table: &Table,
        detector: &DetectorConfig,
        analysed_at: DateTime<Local>,
    ) -> Result<Self> {
        let dataset = build_dataset(table)?;
        let findings = validate(&dataset);
        let mut forest = detector.build();
        let detection = detect::detect(&mut forest, &dataset)?;

        Ok(Analysis {
            source: source.to_path_buf(),
            analysed_at,
            rows_loaded: table.len(),
            column_types: table.column_types(),
            null_counts: table.null_counts(),
            dataset,
            findings,
            detection,
        })
    }

    /// Total null cells across all columns.
    pub fn total_nulls(&self) -> usize {
        self.null_counts.iter().map(|(_, n)| n).sum()
    }
}
