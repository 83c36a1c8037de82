use super::model::{CellValue, Dataset, Record, RowIssue, Table};
use crate::error::{Error, Result};

pub const ID_COLUMN: &str = "VDID";
pub const LON_COLUMN: &str = "PositionLon";
pub const LAT_COLUMN: &str = "PositionLat";

/// Columns every input must carry, in the order they are reported.
pub const REQUIRED_COLUMNS: [&str; 3] = [LON_COLUMN, LAT_COLUMN, ID_COLUMN];

/// Largest absolute longitude and latitude, in degrees.
const LON_LIMIT: f64 = 180.0;
const LAT_LIMIT: f64 = 90.0;

// ---------------------------------------------------------------------------
// Required columns
// ---------------------------------------------------------------------------

/// Names of required columns the table lacks (empty when all are present).
pub fn missing_columns(table: &Table) -> Vec<String> {
    REQUIRED_COLUMNS
        .iter()
        .filter(|c| table.column_index(c).is_none())
        .map(|c| c.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Table → Dataset
// ---------------------------------------------------------------------------

/// Turn the loaded table into device records.
///
/// Fails with [`Error::MissingColumns`] when a required column is absent.
/// A row whose longitude or latitude is null, not a number, or outside the
/// valid degree range is dropped and recorded in [`Dataset::dropped`]; it
/// takes no further part in the run.
pub fn build_dataset(table: &Table) -> Result<Dataset> {
    let missing = missing_columns(table);
    if !missing.is_empty() {
        return Err(Error::MissingColumns(missing));
    }
    // Present: checked just above.
    let (Some(id_idx), Some(lon_idx), Some(lat_idx)) = (
        table.column_index(ID_COLUMN),
        table.column_index(LON_COLUMN),
        table.column_index(LAT_COLUMN),
    ) else {
        return Err(Error::MissingColumns(REQUIRED_COLUMNS.map(String::from).to_vec()));
    };

    let mut dataset = Dataset::default();

    for (row, cells) in table.rows.iter().enumerate() {
        let lon = coordinate(&cells[lon_idx], row, LON_COLUMN, LON_LIMIT);
        let lat = coordinate(&cells[lat_idx], row, LAT_COLUMN, LAT_LIMIT);
        match (lon, lat) {
            (Ok(lon), Ok(lat)) => dataset.records.push(Record {
                row,
                vdid: identifier(&cells[id_idx]),
                lon,
                lat,
            }),
            (lon, lat) => {
                for issue in [lon.err(), lat.err()].into_iter().flatten() {
                    log::warn!("dropping {issue}");
                    dataset.dropped.push(issue);
                }
            }
        }
    }

    log::info!(
        "{} usable records, {} rows dropped",
        dataset.len(),
        dataset.dropped.len()
    );
    Ok(dataset)
}

fn coordinate(
    cell: &CellValue,
    row: usize,
    column: &str,
    limit: f64,
) -> std::result::Result<f64, RowIssue> {
    let value = match cell {
        CellValue::Null => {
            return Err(RowIssue::NullCoordinate {
                row,
                column: column.to_string(),
            })
        }
        other => other.as_f64().ok_or_else(|| RowIssue::NonNumericCoordinate {
            row,
            column: column.to_string(),
            value: other.to_string(),
        })?,
    };
    if value.abs() > limit {
        return Err(RowIssue::CoordinateOutOfRange {
            row,
            column: column.to_string(),
            value,
        });
    }
    Ok(value)
}

fn identifier(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(header: &[&str], rows: &[&[&str]]) -> Table {
        let mut t = Table::new(header.iter().map(|s| s.to_string()).collect());
        for r in rows {
            t.rows.push(r.iter().map(|s| CellValue::infer(s)).collect());
        }
        t
    }

    #[test]
    fn test_missing_columns_reported() {
        let t = table(&["VDID", "Lon", "PositionLat"], &[&["VD1", "1", "2"]]);
        match build_dataset(&t) {
            Err(Error::MissingColumns(cols)) => assert_eq!(cols, vec!["PositionLon"]),
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_all_columns_missing() {
        let t = table(&["a"], &[]);
        assert_eq!(missing_columns(&t), vec!["PositionLon", "PositionLat", "VDID"]);
    }

    #[test]
    fn test_null_coordinates_dropped() {
        let t = table(
            &["VDID", "PositionLon", "PositionLat"],
            &[
                &["VD1", "121.5", "25.0"],
                &["VD2", "", "25.1"],
                &["VD3", "121.6", "NaN"],
                &["VD4", "121.7", "25.2"],
            ],
        );
        let ds = build_dataset(&t).unwrap();
        let ids: Vec<&str> = ds.records.iter().map(|r| r.vdid.as_str()).collect();
        assert_eq!(ids, vec!["VD1", "VD4"]);
        assert_eq!(ds.records[1].row, 3);
        assert_eq!(ds.dropped.len(), 2);
        assert_eq!(
            ds.dropped[0],
            RowIssue::NullCoordinate {
                row: 1,
                column: "PositionLon".into()
            }
        );
    }

    #[test]
    fn test_non_numeric_coordinate_is_recoverable() {
        let t = table(
            &["VDID", "PositionLon", "PositionLat"],
            &[&["VD1", "east", "25.0"], &["VD2", "121", "25"]],
        );
        let ds = build_dataset(&t).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.records[0].lon, 121.0);
        assert!(matches!(
            ds.dropped[0],
            RowIssue::NonNumericCoordinate { row: 0, .. }
        ));
    }

    #[test]
    fn test_out_of_range_coordinates_dropped() {
        let t = table(
            &["VDID", "PositionLon", "PositionLat"],
            &[
                &["VD1", "-1e308", "25.0"],
                &["VD2", "1e308", "25.0"],
                &["VD3", "121.5", "91"],
                &["VD4", "180", "-90"],
            ],
        );
        let ds = build_dataset(&t).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.records[0].vdid, "VD4");
        assert_eq!(ds.dropped.len(), 3);
        assert_eq!(
            ds.dropped[2],
            RowIssue::CoordinateOutOfRange {
                row: 2,
                column: "PositionLat".into(),
                value: 91.0
            }
        );
        assert_eq!(ds.dropped[2].to_string(), "row 2: PositionLat 91 is out of range");
    }
}
