/// Column schema snapshots and change detection
///
/// A `ColumnSchema` is a point-in-time description of one column. Filters
/// carry a snapshot from creation time; the service keeps a full snapshot
/// per view and compares it against the live backing table whenever the
/// host reports that the underlying variable was reassigned or possibly
/// mutated.

use crate::column::{Column, ColumnType, ColumnValue, DisplayType};
use crate::filter::RowFilter;
use crate::sort::ColumnSortKey;
use crate::table::Backing;
use serde::{Deserialize, Serialize};

/// Above this column count the full schema is cached on the view and every
/// change report is treated as a schema change rather than diffed.
pub const SCHEMA_CACHE_THRESHOLD: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub column_name: String,
    pub column_index: usize,
    pub type_name: String,
    pub type_display: DisplayType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl ColumnSchema {
    pub fn from_column(column: &Column, index: usize) -> Self {
        // The zone tag lives on the values; the first tagged one wins
        let timezone = column.iter().find_map(|v| match v {
            ColumnValue::Datetime(_, Some(tz)) => Some(tz.clone()),
            _ => None,
        });
        ColumnSchema {
            column_name: column.name().to_string(),
            column_index: index,
            type_name: column.column_type().type_name().to_string(),
            type_display: column.display_type(),
            timezone,
        }
    }
}

/// Snapshot every column of a backing table.
pub fn full_schema(backing: &Backing) -> Vec<ColumnSchema> {
    let mut out = Vec::with_capacity(backing.num_columns());
    for index in 0..backing.num_columns() {
        if let Ok(column) = backing.column(index) {
            out.push(ColumnSchema::from_column(column, index));
        }
    }
    out
}

/// Schema snapshot for specific indices, silently dropping out-of-range
/// requests.
pub fn schema_for_indices(backing: &Backing, indices: &[usize]) -> Vec<ColumnSchema> {
    indices
        .iter()
        .filter(|&&i| i < backing.num_columns())
        .filter_map(|&i| backing.column(i).ok().map(|c| ColumnSchema::from_column(c, i)))
        .collect()
}

// ===== Schema search =====

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "filter_type", rename_all = "snake_case")]
pub enum SchemaFilter {
    /// Case-insensitive substring match on the column name.
    TextSearch { term: String },
    /// Keep only columns whose display type is in the given set.
    MatchDataTypes { display_types: Vec<DisplayType> },
}

/// Narrowing search over a schema snapshot with pagination. Returns the
/// requested page and the total match count.
pub fn search_schema(
    schema: &[ColumnSchema],
    filters: &[SchemaFilter],
    start_index: usize,
    max_results: usize,
) -> (Vec<ColumnSchema>, usize) {
    let matches: Vec<&ColumnSchema> = schema
        .iter()
        .filter(|col| {
            filters.iter().all(|f| match f {
                SchemaFilter::TextSearch { term } => col
                    .column_name
                    .to_lowercase()
                    .contains(&term.to_lowercase()),
                SchemaFilter::MatchDataTypes { display_types } => {
                    display_types.contains(&col.type_display)
                }
            })
        })
        .collect();
    let total = matches.len();
    let page = matches
        .into_iter()
        .skip(start_index)
        .take(max_results)
        .cloned()
        .collect();
    (page, total)
}

// ===== Change detection =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChange {
    /// Names, order, and types survived; only cell values may differ.
    DataOnly,
    /// Column set changed, or the table is wide enough that diffing is
    /// skipped and a refresh is forced.
    SchemaChanged,
}

/// Compare a previous snapshot against the live backing table.
pub fn classify_change(previous: &[ColumnSchema], backing: &Backing) -> SchemaChange {
    if backing.num_columns() > SCHEMA_CACHE_THRESHOLD {
        return SchemaChange::SchemaChanged;
    }
    let current = full_schema(backing);
    if previous.len() != current.len() {
        return SchemaChange::SchemaChanged;
    }
    for (old, new) in previous.iter().zip(current.iter()) {
        if old.column_name != new.column_name || old.type_name != new.type_name {
            return SchemaChange::SchemaChanged;
        }
    }
    SchemaChange::DataOnly
}

/// After a schema change, rebind filters and sort keys to the new schema.
/// Filters are matched to the new schema by column name; a survivor is
/// retargeted and stays valid as long as its operator still applies to the
/// column's current type (a retype to an incompatible type marks it
/// invalid instead). Sort keys are resolved through the previous snapshot
/// by name and retargeted to the column's new index, or dropped when the
/// column is gone.
pub fn reconcile_state(
    filters: &mut Vec<RowFilter>,
    sort_keys: &mut Vec<ColumnSortKey>,
    previous: &[ColumnSchema],
    current: &[ColumnSchema],
) {
    for filter in filters.iter_mut() {
        let rebound = current
            .iter()
            .find(|col| col.column_name == filter.column_schema.column_name);
        match rebound {
            Some(col) => {
                let applicable = ColumnType::from_type_name(&col.type_name)
                    .map(|ty| crate::filter::kind_applicable(&filter.kind, ty))
                    .unwrap_or(false);
                if applicable {
                    filter.column_schema = col.clone();
                    filter.is_valid = true;
                    filter.error_message = None;
                } else {
                    filter.is_valid = false;
                    filter.error_message = Some(format!(
                        "filter does not apply to column '{}' of type {}",
                        col.column_name, col.type_name
                    ));
                }
            }
            None => {
                filter.is_valid = false;
                filter.error_message = Some(format!(
                    "column '{}' is no longer present",
                    filter.column_schema.column_name
                ));
            }
        }
    }
    *sort_keys = sort_keys
        .iter()
        .filter_map(|key| {
            let name = previous.get(key.column_index).map(|c| &c.column_name)?;
            let col = current.iter().find(|c| &c.column_name == name)?;
            Some(ColumnSortKey {
                column_index: col.column_index,
                ascending: key.ascending,
            })
        })
        .collect();
}
