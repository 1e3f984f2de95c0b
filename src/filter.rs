/// Row filters and the predicate compiler
///
/// A `RowFilter` arrives over the wire with a snapshot of the column schema
/// it was built against. Compilation turns one filter into a boolean mask
/// over the unfiltered row count; masks combine pairwise in a left fold over
/// the filter list, each filter contributing its own and/or `condition`.
/// Filters whose parameters fail to coerce to the column type are marked
/// invalid and dropped from the fold without aborting the rest of the set.
///
/// Null policy (pinned, see the fixture tests at the bottom): a null cell
/// matches `is_null` and the `not_contains` search, and nothing else. In
/// particular nulls fail `!=` comparisons, both emptiness filters, and
/// `set_membership` regardless of the `inclusive` flag.

use crate::column::{
    format_date, format_datetime, format_time, parse_date, parse_datetime, parse_time, Column,
    ColumnType, ColumnValue,
};
use crate::schema::ColumnSchema;
use crate::table::Backing;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

// ===== Wire types =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCondition {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareFilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    RegexMatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "filter_type", rename_all = "snake_case")]
pub enum FilterKind {
    Compare {
        op: CompareFilterOp,
        value: String,
    },
    Between {
        left_value: String,
        right_value: String,
    },
    NotBetween {
        left_value: String,
        right_value: String,
    },
    IsNull,
    NotNull,
    IsTrue,
    IsFalse,
    IsEmpty,
    NotEmpty,
    SetMembership {
        values: Vec<String>,
        inclusive: bool,
    },
    Search {
        search_type: SearchType,
        term: String,
        case_sensitive: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFilter {
    pub filter_id: String,
    pub condition: FilterCondition,
    /// Schema snapshot taken when the filter was created. Compared against
    /// the live schema to invalidate filters after a table reshape.
    pub column_schema: ColumnSchema,
    #[serde(flatten)]
    pub kind: FilterKind,
    #[serde(default = "default_valid")]
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

fn default_valid() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    pub selected_num_rows: usize,
    pub had_errors: bool,
}

/// Whether a filter kind can run against a column of the given type.
/// Mirrors the type checks in `compile_mask`; used when rebinding filters
/// after a schema change retypes a surviving column.
pub fn kind_applicable(kind: &FilterKind, column_type: ColumnType) -> bool {
    match kind {
        FilterKind::IsTrue | FilterKind::IsFalse => column_type == ColumnType::Bool,
        FilterKind::IsEmpty | FilterKind::NotEmpty => column_type == ColumnType::String,
        _ => true,
    }
}

// ===== Literal coercion =====

/// Coerce a wire string to a value of the column's element type.
pub fn coerce_literal(raw: &str, column_type: ColumnType) -> Result<ColumnValue, String> {
    match column_type {
        ColumnType::Int64 => {
            if let Ok(v) = raw.trim().parse::<i64>() {
                return Ok(ColumnValue::Int64(v));
            }
            // A fractional literal against an integer column compares as f64
            raw.trim()
                .parse::<f64>()
                .map(ColumnValue::Float64)
                .map_err(|_| format!("cannot interpret '{}' as a number", raw))
        }
        ColumnType::Float64 => raw
            .trim()
            .parse::<f64>()
            .map(ColumnValue::Float64)
            .map_err(|_| format!("cannot interpret '{}' as a number", raw)),
        ColumnType::Bool => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(ColumnValue::Bool(true)),
            "false" | "0" => Ok(ColumnValue::Bool(false)),
            _ => Err(format!("cannot interpret '{}' as a boolean", raw)),
        },
        ColumnType::Date => parse_date(raw.trim())
            .map(ColumnValue::Date)
            .ok_or_else(|| format!("cannot interpret '{}' as a date", raw)),
        ColumnType::Datetime => {
            let trimmed = raw.trim();
            if let Some(ms) = parse_datetime(trimmed) {
                return Ok(ColumnValue::Datetime(ms, None));
            }
            // A bare date against a datetime column means midnight that day
            parse_date(trimmed)
                .map(|days| ColumnValue::Datetime(days as i64 * 86_400_000, None))
                .ok_or_else(|| format!("cannot interpret '{}' as a datetime", raw))
        }
        ColumnType::Time => parse_time(raw.trim())
            .map(ColumnValue::Time)
            .ok_or_else(|| format!("cannot interpret '{}' as a time", raw)),
        ColumnType::String => Ok(ColumnValue::String(raw.to_string())),
    }
}

/// Three-way comparison between a cell and a coerced literal. Returns None
/// when the cell is null or the pair is incomparable.
fn compare_cell(cell: &ColumnValue, literal: &ColumnValue) -> Option<std::cmp::Ordering> {
    if cell.is_null() || literal.is_null() {
        return None;
    }
    match (cell, literal) {
        (ColumnValue::String(a), ColumnValue::String(b)) => Some(a.cmp(b)),
        (ColumnValue::Bool(a), ColumnValue::Bool(b)) => Some(a.cmp(b)),
        _ => {
            let a = cell.numeric_value()?;
            let b = literal.numeric_value()?;
            a.partial_cmp(&b)
        }
    }
}

fn compare_matches(cell: &ColumnValue, op: CompareFilterOp, literal: &ColumnValue) -> bool {
    use std::cmp::Ordering::*;
    match compare_cell(cell, literal) {
        None => false,
        Some(ord) => match op {
            CompareFilterOp::Eq => ord == Equal,
            CompareFilterOp::NotEq => ord != Equal,
            CompareFilterOp::Lt => ord == Less,
            CompareFilterOp::LtEq => ord != Greater,
            CompareFilterOp::Gt => ord == Greater,
            CompareFilterOp::GtEq => ord != Less,
        },
    }
}

/// Text rendition of a cell for the search filters. None for null.
fn cell_text(cell: &ColumnValue) -> Option<String> {
    match cell {
        ColumnValue::Null => None,
        ColumnValue::String(s) => Some(s.clone()),
        ColumnValue::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        ColumnValue::Int64(v) => Some(v.to_string()),
        ColumnValue::Float64(v) => Some(v.to_string()),
        ColumnValue::Date(days) => Some(format_date(*days)),
        ColumnValue::Datetime(ms, _) => Some(format_datetime(*ms)),
        ColumnValue::Time(ms) => Some(format_time(*ms)),
    }
}

// ===== Mask compilation =====

/// Compile one filter into a boolean mask over the unfiltered rows.
pub fn compile_mask(backing: &Backing, filter: &RowFilter) -> Result<Vec<bool>, String> {
    let column = backing.column(filter.column_schema.column_index)?;
    let column_type = column.column_type();
    let num_rows = backing.num_rows();
    let mut mask = vec![false; num_rows];

    match &filter.kind {
        FilterKind::Compare { op, value } => {
            let literal = coerce_literal(value, column_type)?;
            for (row, cell) in column.iter().enumerate() {
                mask[row] = compare_matches(cell, *op, &literal);
            }
        }
        FilterKind::Between {
            left_value,
            right_value,
        }
        | FilterKind::NotBetween {
            left_value,
            right_value,
        } => {
            let negate = matches!(filter.kind, FilterKind::NotBetween { .. });
            let lo = coerce_literal(left_value, column_type)?;
            let hi = coerce_literal(right_value, column_type)?;
            for (row, cell) in column.iter().enumerate() {
                if cell.is_null() {
                    continue;
                }
                let inside = compare_matches(cell, CompareFilterOp::GtEq, &lo)
                    && compare_matches(cell, CompareFilterOp::LtEq, &hi);
                mask[row] = inside != negate;
            }
        }
        FilterKind::IsNull => {
            for (row, cell) in column.iter().enumerate() {
                mask[row] = cell.is_null();
            }
        }
        FilterKind::NotNull => {
            for (row, cell) in column.iter().enumerate() {
                mask[row] = !cell.is_null();
            }
        }
        FilterKind::IsTrue | FilterKind::IsFalse => {
            if column_type != ColumnType::Bool {
                return Err(format!(
                    "boolean filter applied to {} column '{}'",
                    column_type.type_name(),
                    column.name()
                ));
            }
            let want = matches!(filter.kind, FilterKind::IsTrue);
            for (row, cell) in column.iter().enumerate() {
                if let ColumnValue::Bool(b) = cell {
                    mask[row] = *b == want;
                }
            }
        }
        FilterKind::IsEmpty | FilterKind::NotEmpty => {
            if column_type != ColumnType::String {
                return Err(format!(
                    "emptiness filter applied to {} column '{}'",
                    column_type.type_name(),
                    column.name()
                ));
            }
            let want_empty = matches!(filter.kind, FilterKind::IsEmpty);
            for (row, cell) in column.iter().enumerate() {
                if let ColumnValue::String(s) = cell {
                    mask[row] = s.is_empty() == want_empty;
                }
            }
        }
        FilterKind::SetMembership { values, inclusive } => {
            let mut members = Vec::with_capacity(values.len());
            for raw in values {
                members.push(coerce_literal(raw, column_type)?);
            }
            for (row, cell) in column.iter().enumerate() {
                if cell.is_null() {
                    continue;
                }
                let found = members
                    .iter()
                    .any(|m| compare_cell(cell, m) == Some(std::cmp::Ordering::Equal));
                mask[row] = found == *inclusive;
            }
        }
        FilterKind::Search {
            search_type,
            term,
            case_sensitive,
        } => {
            compile_search_mask(column, *search_type, term, *case_sensitive, &mut mask)?;
        }
    }

    Ok(mask)
}

fn compile_search_mask(
    column: &Column,
    search_type: SearchType,
    term: &str,
    case_sensitive: bool,
    mask: &mut [bool],
) -> Result<(), String> {
    if search_type == SearchType::RegexMatch {
        let re = RegexBuilder::new(term)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| format!("invalid regular expression '{}': {}", term, e))?;
        for (cell, slot) in column.iter().zip(mask.iter_mut()) {
            if let Some(text) = cell_text(cell) {
                *slot = re.is_match(&text);
            }
        }
        return Ok(());
    }

    let needle = if case_sensitive {
        term.to_string()
    } else {
        term.to_lowercase()
    };
    for (cell, slot) in column.iter().zip(mask.iter_mut()) {
        *slot = match (cell_text(cell), search_type) {
            // Null rows satisfy not_contains, mirroring na=True semantics
            (None, SearchType::NotContains) => true,
            (None, _) => false,
            (Some(text), st) => {
                let hay = if case_sensitive {
                    text
                } else {
                    text.to_lowercase()
                };
                match st {
                    SearchType::Contains => hay.contains(&needle),
                    SearchType::NotContains => !hay.contains(&needle),
                    SearchType::StartsWith => hay.starts_with(&needle),
                    SearchType::EndsWith => hay.ends_with(&needle),
                    SearchType::RegexMatch => unreachable!(),
                }
            }
        };
    }
    Ok(())
}

/// Evaluate a filter set against a backing table. Marks failed filters
/// invalid in place, folds the valid masks left to right using each
/// filter's own condition, and returns the selected physical row indices
/// along with an error flag.
pub fn apply_row_filters(backing: &Backing, filters: &mut [RowFilter]) -> (Vec<usize>, bool) {
    let num_rows = backing.num_rows();
    let mut combined: Option<Vec<bool>> = None;
    let mut had_errors = false;

    for filter in filters.iter_mut() {
        if !filter.is_valid {
            had_errors = true;
            continue;
        }
        match compile_mask(backing, filter) {
            Ok(mask) => {
                filter.error_message = None;
                combined = Some(match combined {
                    None => mask,
                    Some(acc) => acc
                        .iter()
                        .zip(mask.iter())
                        .map(|(a, b)| match filter.condition {
                            FilterCondition::And => *a && *b,
                            FilterCondition::Or => *a || *b,
                        })
                        .collect(),
                });
            }
            Err(message) => {
                filter.is_valid = false;
                filter.error_message = Some(message);
                had_errors = true;
            }
        }
    }

    let selected = match combined {
        None => (0..num_rows).collect(),
        Some(mask) => mask
            .iter()
            .enumerate()
            .filter_map(|(row, keep)| if *keep { Some(row) } else { None })
            .collect(),
    };
    (selected, had_errors)
}
