/// Stable multi-key sort over a filtered index array
///
/// Sorting never touches the backing data. It permutes an index array of
/// physical row positions: the caller hands in the filtered rows (or the
/// identity range) and gets back the same rows reordered by the key list,
/// primary key first, later keys breaking ties, original order breaking
/// final ties. Nulls order after every non-null value in both directions.

use crate::column::ColumnValue;
use crate::table::Backing;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSortKey {
    pub column_index: usize,
    pub ascending: bool,
}

/// Order two cells of the same column. Null sorts last regardless of
/// direction, so the directional flip below only applies to non-null pairs.
fn compare_values(a: &ColumnValue, b: &ColumnValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    match (a, b) {
        (ColumnValue::String(x), ColumnValue::String(y)) => x.cmp(y),
        (ColumnValue::Bool(x), ColumnValue::Bool(y)) => x.cmp(y),
        _ => match (a.numeric_value(), b.numeric_value()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

/// Sort the given physical row indices by the key list. With no keys the
/// input order is returned untouched.
pub fn sort_indices(
    backing: &Backing,
    rows: &[usize],
    keys: &[ColumnSortKey],
) -> Result<Vec<usize>, String> {
    let mut ordered: Vec<usize> = rows.to_vec();
    if keys.is_empty() {
        return Ok(ordered);
    }

    // Resolve columns up front so a bad index fails before sorting starts
    let mut columns = Vec::with_capacity(keys.len());
    for key in keys {
        columns.push((backing.column(key.column_index)?, key.ascending));
    }

    ordered.sort_by(|&ra, &rb| {
        for (column, ascending) in &columns {
            let a = column.get_ref(ra).unwrap_or(&ColumnValue::Null);
            let b = column.get_ref(rb).unwrap_or(&ColumnValue::Null);
            let null_involved = a.is_null() || b.is_null();
            let ord = compare_values(a, b);
            if ord != Ordering::Equal {
                // Keep nulls last when descending too
                return if *ascending || null_involved {
                    ord
                } else {
                    ord.reverse()
                };
            }
        }
        Ordering::Equal
    });
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, ColumnType};
    use crate::table::Table;

    fn backing(columns: Vec<Column>) -> Backing {
        Backing::Frame(Table::new("t".to_string(), columns).unwrap())
    }

    fn int_column(name: &str, values: Vec<Option<i64>>) -> Column {
        Column::from_values(
            name.to_string(),
            ColumnType::Int64,
            values
                .into_iter()
                .map(|v| v.map_or(ColumnValue::Null, ColumnValue::Int64))
                .collect(),
        )
        .unwrap()
    }

    fn str_column(name: &str, values: Vec<&str>) -> Column {
        Column::from_values(
            name.to_string(),
            ColumnType::String,
            values
                .into_iter()
                .map(|s| ColumnValue::String(s.to_string()))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_descending_sort_order() {
        let b = backing(vec![int_column(
            "a",
            vec![Some(1), Some(0), Some(3), Some(4), Some(5)],
        )]);
        let rows: Vec<usize> = (0..5).collect();
        let ordered = sort_indices(
            &b,
            &rows,
            &[ColumnSortKey {
                column_index: 0,
                ascending: false,
            }],
        )
        .unwrap();
        // Values 5,4,3,1,0 live at physical rows 4,3,2,0,1
        assert_eq!(ordered, vec![4, 3, 2, 0, 1]);
    }

    #[test]
    fn test_no_keys_preserves_input_order() {
        let b = backing(vec![int_column("a", vec![Some(3), Some(1), Some(2)])]);
        let rows = vec![2, 0, 1];
        let ordered = sort_indices(&b, &rows, &[]).unwrap();
        assert_eq!(ordered, vec![2, 0, 1]);
    }

    #[test]
    fn test_multi_key_tie_breaking() {
        let group = str_column("g", vec!["b", "a", "b", "a"]);
        let value = int_column("v", vec![Some(2), Some(9), Some(1), Some(3)]);
        let b = backing(vec![group, value]);
        let rows: Vec<usize> = (0..4).collect();
        let ordered = sort_indices(
            &b,
            &rows,
            &[
                ColumnSortKey {
                    column_index: 0,
                    ascending: true,
                },
                ColumnSortKey {
                    column_index: 1,
                    ascending: true,
                },
            ],
        )
        .unwrap();
        // Group a: values 3,9 at rows 3,1. Group b: values 1,2 at rows 2,0.
        assert_eq!(ordered, vec![3, 1, 2, 0]);
    }

    #[test]
    fn test_stability_preserves_original_order_on_ties() {
        let b = backing(vec![int_column(
            "a",
            vec![Some(1), Some(1), Some(1), Some(0)],
        )]);
        let rows: Vec<usize> = (0..4).collect();
        let ordered = sort_indices(
            &b,
            &rows,
            &[ColumnSortKey {
                column_index: 0,
                ascending: true,
            }],
        )
        .unwrap();
        assert_eq!(ordered, vec![3, 0, 1, 2]);
    }

    #[test]
    fn test_nulls_sort_last_both_directions() {
        let b = backing(vec![int_column("a", vec![Some(2), None, Some(1)])]);
        let rows: Vec<usize> = (0..3).collect();
        let asc = sort_indices(
            &b,
            &rows,
            &[ColumnSortKey {
                column_index: 0,
                ascending: true,
            }],
        )
        .unwrap();
        assert_eq!(asc, vec![2, 0, 1]);
        let desc = sort_indices(
            &b,
            &rows,
            &[ColumnSortKey {
                column_index: 0,
                ascending: false,
            }],
        )
        .unwrap();
        assert_eq!(desc, vec![0, 2, 1]);
    }

    #[test]
    fn test_sort_over_filtered_subset() {
        let b = backing(vec![int_column(
            "a",
            vec![Some(5), Some(3), Some(4), Some(1), Some(2)],
        )]);
        // Pre-filtered to odd physical rows only
        let rows = vec![1, 3];
        let ordered = sort_indices(
            &b,
            &rows,
            &[ColumnSortKey {
                column_index: 0,
                ascending: true,
            }],
        )
        .unwrap();
        assert_eq!(ordered, vec![3, 1]);
    }

    #[test]
    fn test_bad_column_index_errors() {
        let b = backing(vec![int_column("a", vec![Some(1)])]);
        let result = sort_indices(
            &b,
            &[0],
            &[ColumnSortKey {
                column_index: 9,
                ascending: true,
            }],
        );
        assert!(result.is_err());
    }
}
