/// TableScope Backing Store
///
/// The engine never owns the semantics of the host object it explores; it
/// sees a `Backing`: a closed union over the table kinds we support
/// (dataframe, series, array). All structural inspection and value access
/// goes through the accessor methods here, so the view/filter/profile layers
/// are written once against this interface.
///
/// A `Backing` is immutable after construction. "The variable changed" is
/// modeled by handing the engine a new `Backing` for the same path, never by
/// mutating one in place, which is what makes sharing via `Arc` sound.

use crate::column::{
    parse_date, parse_datetime, Column, ColumnType, ColumnValue,
};
use serde_json::Value as JsonValue;

/// A named collection of equal-length columns with optional row labels.
pub struct Table {
    name: String,
    columns: Vec<Column>,
    row_labels: Option<Column>,
}

impl Table {
    pub fn new(name: String, columns: Vec<Column>) -> Result<Self, String> {
        Self::with_row_labels(name, columns, None)
    }

    pub fn with_row_labels(
        name: String,
        columns: Vec<Column>,
        row_labels: Option<Column>,
    ) -> Result<Self, String> {
        if let Some(first) = columns.first() {
            let len = first.len();
            for col in &columns {
                if col.len() != len {
                    return Err(format!(
                        "Column '{}' has length {}, expected {}",
                        col.name(),
                        col.len(),
                        len
                    ));
                }
            }
            if let Some(labels) = &row_labels {
                if labels.len() != len {
                    return Err(format!(
                        "Row labels have length {}, expected {}",
                        labels.len(),
                        len
                    ));
                }
            }
        }
        Ok(Table {
            name,
            columns,
            row_labels,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.len())
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn row_labels(&self) -> Option<&Column> {
        self.row_labels.as_ref()
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Table {{ name: '{}', columns: {}, rows: {} }}",
            self.name,
            self.num_columns(),
            self.num_rows()
        )
    }
}

/// The closed union of backing-table kinds the engine supports.
#[derive(Debug)]
pub enum Backing {
    /// A dataframe-like object: many named columns, optional row labels.
    Frame(Table),
    /// A one-column series, optionally labeled.
    Series { column: Column, row_labels: Option<Column> },
    /// A bare 1-D array: one unnamed column, never labeled.
    Array { column: Column },
}

impl Backing {
    pub fn kind(&self) -> &'static str {
        match self {
            Backing::Frame(_) => "frame",
            Backing::Series { .. } => "series",
            Backing::Array { .. } => "array",
        }
    }

    pub fn num_rows(&self) -> usize {
        match self {
            Backing::Frame(t) => t.num_rows(),
            Backing::Series { column, .. } => column.len(),
            Backing::Array { column } => column.len(),
        }
    }

    pub fn num_columns(&self) -> usize {
        match self {
            Backing::Frame(t) => t.num_columns(),
            Backing::Series { .. } | Backing::Array { .. } => 1,
        }
    }

    pub fn column(&self, index: usize) -> Result<&Column, String> {
        let col = match self {
            Backing::Frame(t) => t.column(index),
            Backing::Series { column, .. } | Backing::Array { column } => {
                if index == 0 {
                    Some(column)
                } else {
                    None
                }
            }
        };
        col.ok_or_else(|| format!("Column index {} out of range", index))
    }

    pub fn row_labels(&self) -> Option<&Column> {
        match self {
            Backing::Frame(t) => t.row_labels(),
            Backing::Series { row_labels, .. } => row_labels.as_ref(),
            Backing::Array { .. } => None,
        }
    }

    pub fn has_row_labels(&self) -> bool {
        self.row_labels().is_some()
    }
}

// ============================================================================
// JSON ingestion
// ============================================================================

/// Build a `Backing::Frame` from a JSON object of the shape
/// `{"col_a": [1, 2, 3], "col_b": ["x", null, "z"]}`.
///
/// Column types are inferred from the first non-null element of each list:
/// integers -> int64, other numbers -> float64, booleans -> bool, strings
/// that parse as ISO dates/datetimes -> date/datetime, remaining strings ->
/// string. All-null columns default to string.
pub fn frame_from_json(name: &str, json: &JsonValue) -> Result<Backing, String> {
    let obj = json
        .as_object()
        .ok_or("Expected a JSON object of column name -> value list")?;

    let mut columns = Vec::with_capacity(obj.len());
    let mut expected_len: Option<usize> = None;

    for (col_name, cells) in obj {
        let cells = cells
            .as_array()
            .ok_or_else(|| format!("Column '{}' is not a JSON array", col_name))?;
        if let Some(len) = expected_len {
            if cells.len() != len {
                return Err(format!(
                    "Column '{}' has {} values, expected {}",
                    col_name,
                    cells.len(),
                    len
                ));
            }
        } else {
            expected_len = Some(cells.len());
        }

        let col_type = infer_column_type(cells);
        let mut column = Column::new(col_name.clone(), col_type);
        for cell in cells {
            column.push(json_to_column_value(cell, col_type)?)?;
        }
        columns.push(column);
    }

    Table::new(name.to_string(), columns).map(Backing::Frame)
}

/// Build a `Backing::Series` from a JSON value list.
pub fn series_from_json(name: &str, cells: &JsonValue) -> Result<Backing, String> {
    let cells = cells.as_array().ok_or("Expected a JSON array of values")?;
    let col_type = infer_column_type(cells);
    let mut column = Column::new(name.to_string(), col_type);
    for cell in cells {
        column.push(json_to_column_value(cell, col_type)?)?;
    }
    Ok(Backing::Series {
        column,
        row_labels: None,
    })
}

fn infer_column_type(cells: &[JsonValue]) -> ColumnType {
    for cell in cells {
        match cell {
            JsonValue::Null => continue,
            JsonValue::Bool(_) => return ColumnType::Bool,
            JsonValue::Number(n) => {
                return if n.is_i64() {
                    ColumnType::Int64
                } else {
                    ColumnType::Float64
                };
            }
            JsonValue::String(s) => {
                if (s.contains('T') || (s.contains(' ') && s.contains(':')))
                    && parse_datetime(s).is_some()
                {
                    return ColumnType::Datetime;
                }
                if s.len() == 10 && s.chars().nth(4) == Some('-') && parse_date(s).is_some() {
                    return ColumnType::Date;
                }
                return ColumnType::String;
            }
            _ => return ColumnType::String,
        }
    }
    ColumnType::String
}

fn json_to_column_value(cell: &JsonValue, col_type: ColumnType) -> Result<ColumnValue, String> {
    match cell {
        JsonValue::Null => Ok(ColumnValue::Null),
        JsonValue::Bool(b) => Ok(ColumnValue::Bool(*b)),
        JsonValue::Number(n) => match col_type {
            ColumnType::Int64 => n
                .as_i64()
                .map(ColumnValue::Int64)
                .ok_or_else(|| format!("Cannot represent {} as int64", n)),
            _ => n
                .as_f64()
                .map(ColumnValue::Float64)
                .ok_or_else(|| format!("Cannot represent {} as float64", n)),
        },
        JsonValue::String(s) => match col_type {
            ColumnType::Datetime => parse_datetime(s)
                .map(|ms| ColumnValue::Datetime(ms, None))
                .ok_or_else(|| format!("Cannot parse '{}' as datetime", s)),
            ColumnType::Date => parse_date(s)
                .map(ColumnValue::Date)
                .ok_or_else(|| format!("Cannot parse '{}' as date", s)),
            _ => Ok(ColumnValue::String(s.clone())),
        },
        other => Err(format!("Unsupported JSON value: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_length_validation() {
        let a = Column::from_values(
            "a".to_string(),
            ColumnType::Int64,
            vec![ColumnValue::Int64(1), ColumnValue::Int64(2)],
        )
        .unwrap();
        let b = Column::from_values(
            "b".to_string(),
            ColumnType::Int64,
            vec![ColumnValue::Int64(1)],
        )
        .unwrap();
        assert!(Table::new("bad".to_string(), vec![a, b]).is_err());
    }

    #[test]
    fn test_backing_accessors() {
        let backing = frame_from_json(
            "t",
            &json!({"a": [1, 2, 3], "b": ["x", null, "z"]}),
        )
        .unwrap();

        assert_eq!(backing.kind(), "frame");
        assert_eq!(backing.num_rows(), 3);
        assert_eq!(backing.num_columns(), 2);
        assert_eq!(backing.column(0).unwrap().name(), "a");
        assert!(backing.column(7).is_err());
        assert!(!backing.has_row_labels());
    }

    #[test]
    fn test_frame_from_json_type_inference() {
        let backing = frame_from_json(
            "t",
            &json!({
                "ints": [1, 2],
                "floats": [1.5, null],
                "bools": [true, false],
                "dates": ["2024-01-01", "2024-01-02"],
                "stamps": ["2024-01-01T10:00:00", null],
                "words": ["a", "b"],
            }),
        )
        .unwrap();

        let types: Vec<ColumnType> = (0..6)
            .map(|i| backing.column(i).unwrap().column_type())
            .collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Bool,      // "bools" (serde_json maps sort keys)
                ColumnType::Date,      // "dates"
                ColumnType::Float64,   // "floats"
                ColumnType::Int64,     // "ints"
                ColumnType::Datetime,  // "stamps"
                ColumnType::String,    // "words"
            ]
        );
    }

    #[test]
    fn test_series_from_json() {
        let backing = series_from_json("s", &json!([10, 20, null])).unwrap();
        assert_eq!(backing.kind(), "series");
        assert_eq!(backing.num_columns(), 1);
        assert_eq!(backing.num_rows(), 3);
        assert!(backing.column(0).unwrap().is_null_at(2));
    }

    #[test]
    fn test_ragged_frame_rejected() {
        assert!(frame_from_json("t", &json!({"a": [1, 2], "b": [1]})).is_err());
    }
}
