use std::fs::File;
use std::io;
use std::path::Path;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use arrow::util::display::array_value_to_string;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CellValue, Table};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a VD table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row plus one row per device (anything unknown is read as CSV too)
/// * `.json`    – `[{ "VDID": "...", "PositionLon": 121.5, ... }, ...]`
/// * `.parquet` – flat columns as written by `df.to_parquet()`
pub fn load_file(path: &Path) -> Result<Table> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let file = open(path)?;
    let table = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path, file)?,
        "json" => load_json(path, file)?,
        _ => load_csv(path, file)?,
    };

    log::info!(
        "loaded {} rows x {} columns from {}",
        table.len(),
        table.columns.len(),
        path.display()
    );
    Ok(table)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::InputNotFound(path.to_path_buf()),
        _ => Error::parse(path, e),
    })
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, every later row has the same
/// number of fields. Cell types are inferred per cell.
fn load_csv(path: &Path, file: File) -> Result<Table> {
    let mut reader = csv::Reader::from_reader(file);
    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| Error::parse(path, format!("reading CSV headers: {e}")))?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.trim().to_string()
        })
        .collect();

    let mut table = Table::new(columns);

    for (row_no, result) in reader.records().enumerate() {
        let record = result.map_err(|e| Error::parse(path, format!("CSV row {row_no}: {e}")))?;
        table.rows.push(record.iter().map(CellValue::infer).collect());
    }

    Ok(table)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "VDID": "VD-N1-0001", "PositionLon": 121.51, "PositionLat": 25.04 },
///   ...
/// ]
/// ```
///
/// Columns are the union of all keys, in the order they are first seen.
/// Keys absent from a record read as null.
fn load_json(path: &Path, file: File) -> Result<Table> {
    let root: JsonValue = serde_json::from_reader(io::BufReader::new(file))
        .map_err(|e| Error::parse(path, format!("parsing JSON: {e}")))?;

    let records = root
        .as_array()
        .ok_or_else(|| Error::parse(path, "expected top-level JSON array"))?;

    let mut columns: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| Error::parse(path, format!("row {i} is not a JSON object")))?;
        for key in obj.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut table = Table::new(columns);
    for rec in records {
        // Checked to be an object above.
        let Some(obj) = rec.as_object() else { continue };
        let row = table
            .columns
            .iter()
            .map(|col| obj.get(col).map(json_to_cell).unwrap_or(CellValue::Null))
            .collect();
        table.rows.push(row);
    }

    Ok(table)
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::infer(s),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one flat column per field.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path, file: File) -> Result<Table> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::parse(path, format!("reading parquet metadata: {e}")))?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder
        .build()
        .map_err(|e| Error::parse(path, format!("building parquet reader: {e}")))?;

    let mut table = Table::new(columns);

    for batch_result in reader {
        let batch = batch_result
            .map_err(|e| Error::parse(path, format!("reading parquet record batch: {e}")))?;
        for row in 0..batch.num_rows() {
            let cells = batch
                .columns()
                .iter()
                .map(|col| extract_cell(col, row))
                .collect();
            table.rows.push(cells);
        }
    }

    Ok(table)
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &ArrayRef, row: usize) -> CellValue {
    if col.is_null(row) {
        return CellValue::Null;
    }
    match col.data_type() {
        DataType::Utf8 => CellValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => CellValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => CellValue::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => CellValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::Float32 => float_cell(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => float_cell(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => CellValue::Bool(col.as_boolean().value(row)),
        _ => match array_value_to_string(col.as_ref(), row) {
            Ok(s) => CellValue::infer(&s),
            Err(_) => CellValue::Null,
        },
    }
}

/// pandas writes missing floats as NaN rather than null.
fn float_cell(v: f64) -> CellValue {
    if v.is_nan() {
        CellValue::Null
    } else {
        CellValue::Float(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_load_csv() {
        let f = write_temp(
            ".csv",
            "\u{feff}VDID,PositionLon,PositionLat\nVD1,121.5,25.0\nVD2,,25.1\n",
        );
        let table = load_file(f.path()).unwrap();
        assert_eq!(table.columns, vec!["VDID", "PositionLon", "PositionLat"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][1], CellValue::Float(121.5));
        assert_eq!(table.rows[1][1], CellValue::Null);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = load_file(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, Error::InputNotFound(_)));
    }

    #[test]
    fn test_ragged_csv_is_parse_error() {
        let f = write_temp(".csv", "VDID,PositionLon,PositionLat\nVD1,121.5\n");
        let err = load_file(f.path()).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "{err}");
    }

    #[test]
    fn test_load_json_records() {
        let f = write_temp(
            ".json",
            r#"[{"VDID":"VD1","PositionLon":121.5,"PositionLat":25},
                {"VDID":"VD2","PositionLon":null,"PositionLat":25.1}]"#,
        );
        let table = load_file(f.path()).unwrap();
        assert_eq!(table.len(), 2);
        let lon = table.column_index("PositionLon").unwrap();
        let lat = table.column_index("PositionLat").unwrap();
        assert_eq!(table.rows[0][lat], CellValue::Integer(25));
        assert_eq!(table.rows[1][lon], CellValue::Null);
    }

    #[test]
    fn test_json_must_be_array() {
        let f = write_temp(".json", r#"{"VDID":"VD1"}"#);
        assert!(matches!(
            load_file(f.path()).unwrap_err(),
            Error::Parse { .. }
        ));
    }

    #[test]
    fn test_load_parquet() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("VDID", DataType::Utf8, false),
            Field::new("PositionLon", DataType::Float64, true),
            Field::new("PositionLat", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["VD1", "VD2"])),
                Arc::new(Float64Array::from(vec![Some(121.5), Some(f64::NAN)])),
                Arc::new(Float64Array::from(vec![Some(25.0), None])),
            ],
        )
        .unwrap();

        let f = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer = ArrowWriter::try_new(f.as_file().try_clone().unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_file(f.path()).unwrap();
        assert_eq!(table.columns, vec!["VDID", "PositionLon", "PositionLat"]);
        assert_eq!(table.rows[0][0], CellValue::String("VD1".into()));
        assert_eq!(table.rows[1][1], CellValue::Null);
        assert_eq!(table.rows[1][2], CellValue::Null);
    }
}
