use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// CellValue – a single cell of the loaded table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring the dtypes pandas infers from a CSV.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// Text that reads as a missing value, matching pandas' default `na_values`.
const NULL_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl CellValue {
    /// Infer a typed value from raw text. Empty text and the usual missing
    /// markers (`NA`, `N/A`, `NaN`, `None`, ...) become `Null`.
    pub fn infer(s: &str) -> CellValue {
        let s = s.trim();
        if s.is_empty() || NULL_MARKERS.contains(&s) {
            return CellValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return CellValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return CellValue::Float(f);
        }
        match s {
            "true" | "True" | "TRUE" => CellValue::Bool(true),
            "false" | "False" | "FALSE" => CellValue::Bool(false),
            _ => CellValue::String(s.to_string()),
        }
    }

    /// Numeric view of the value, used for coordinates.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) if v.is_finite() => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

// ---------------------------------------------------------------------------
// Table – the file as loaded, before validation
// ---------------------------------------------------------------------------

/// Column-oriented dtype summary of one column, named the pandas way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int64,
    Float64,
    Bool,
    Object,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::Bool => "bool",
            ColumnType::Object => "object",
        };
        f.write_str(name)
    }
}

/// The raw table: header order is preserved, every row has one cell per column.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Dtype of every column. A column that is entirely null reads as
    /// `float64`, like pandas.
    pub fn column_types(&self) -> Vec<(String, ColumnType)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let mut has_int = false;
                let mut has_float = false;
                let mut has_bool = false;
                let mut has_other = false;
                for row in &self.rows {
                    match &row[idx] {
                        CellValue::Integer(_) => has_int = true,
                        CellValue::Float(_) => has_float = true,
                        CellValue::Bool(_) => has_bool = true,
                        CellValue::String(_) => has_other = true,
                        CellValue::Null => {}
                    }
                }
                let numeric = has_int || has_float;
                let ty = if has_other || (has_bool && numeric) {
                    ColumnType::Object
                } else if has_bool {
                    ColumnType::Bool
                } else if has_int && !has_float && !self.has_nulls(idx) {
                    ColumnType::Int64
                } else {
                    ColumnType::Float64
                };
                (name.clone(), ty)
            })
            .collect()
    }

    /// Null count per column, in header order.
    pub fn null_counts(&self) -> Vec<(String, usize)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let n = self.rows.iter().filter(|r| r[idx].is_null()).count();
                (name.clone(), n)
            })
            .collect()
    }

    fn has_nulls(&self, idx: usize) -> bool {
        self.rows.iter().any(|r| r[idx].is_null())
    }
}

// ---------------------------------------------------------------------------
// Record / Dataset – validated device rows
// ---------------------------------------------------------------------------

/// One detector device with a usable position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Zero-based index of the source row in the loaded table.
    pub row: usize,
    pub vdid: String,
    pub lon: f64,
    pub lat: f64,
}

/// Why a row was left out of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowIssue {
    NullCoordinate { row: usize, column: String },
    NonNumericCoordinate { row: usize, column: String, value: String },
    CoordinateOutOfRange { row: usize, column: String, value: f64 },
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowIssue::NullCoordinate { row, column } => {
                write!(f, "row {row}: {column} is missing")
            }
            RowIssue::NonNumericCoordinate { row, column, value } => {
                write!(f, "row {row}: {column} '{value}' is not a number")
            }
            RowIssue::CoordinateOutOfRange { row, column, value } => {
                write!(f, "row {row}: {column} {value} is out of range")
            }
        }
    }
}

/// The validated dataset with the rows that were dropped on the way.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<Record>,
    pub dropped: Vec<RowIssue>,
}

impl Dataset {
    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `(lon, lat)` pairs in record order, the detector's input.
    pub fn coordinates(&self) -> Vec<[f64; 2]> {
        self.records.iter().map(|r| [r.lon, r.lat]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_cell_types() {
        assert_eq!(CellValue::infer(""), CellValue::Null);
        assert_eq!(CellValue::infer("NaN"), CellValue::Null);
        assert_eq!(CellValue::infer("N/A"), CellValue::Null);
        assert_eq!(CellValue::infer(" NA "), CellValue::Null);
        assert_eq!(CellValue::infer("None"), CellValue::Null);
        assert_eq!(CellValue::infer("-nan"), CellValue::Null);
        assert_eq!(CellValue::infer("#N/A"), CellValue::Null);
        assert_eq!(CellValue::infer("42"), CellValue::Integer(42));
        assert_eq!(CellValue::infer("121.5"), CellValue::Float(121.5));
        assert_eq!(CellValue::infer("True"), CellValue::Bool(true));
        assert_eq!(
            CellValue::infer("VD-N1-001"),
            CellValue::String("VD-N1-001".into())
        );
    }

    #[test]
    fn test_column_types_and_nulls() {
        let mut table = Table::new(vec!["VDID".into(), "Lanes".into(), "PositionLon".into()]);
        table.rows.push(vec![
            CellValue::infer("VD1"),
            CellValue::infer("3"),
            CellValue::infer("121.5"),
        ]);
        table.rows.push(vec![
            CellValue::infer("VD2"),
            CellValue::infer("2"),
            CellValue::infer(""),
        ]);

        let types = table.column_types();
        assert_eq!(types[0].1, ColumnType::Object);
        assert_eq!(types[1].1, ColumnType::Int64);
        assert_eq!(types[2].1, ColumnType::Float64);

        let nulls = table.null_counts();
        assert_eq!(nulls[2], ("PositionLon".to_string(), 1));
        assert_eq!(nulls[0].1, 0);
    }

    #[test]
    fn test_int_column_with_null_is_float() {
        let mut table = Table::new(vec!["n".into()]);
        table.rows.push(vec![CellValue::Integer(1)]);
        table.rows.push(vec![CellValue::Null]);
        assert_eq!(table.column_types()[0].1, ColumnType::Float64);
    }
}
