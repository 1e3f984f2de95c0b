/// Table views
///
/// A `TableView` owns the mutable state layered over one immutable backing
/// table: the active row filters, the sort keys, and the cached virtual
/// ordering that maps view positions to physical rows. The ordering is
/// recomputed lazily; any state change or external mutation report flips
/// the dirty flag and the next data access rebuilds it.

use crate::filter::{apply_row_filters, FilterResult, RowFilter};
use crate::format::{format_value, FormatOptions};
use crate::schema::{
    full_schema, schema_for_indices, search_schema, ColumnSchema, SchemaFilter,
    SCHEMA_CACHE_THRESHOLD,
};
use crate::sort::{sort_indices, ColumnSortKey};
use crate::table::Backing;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ===== Selection wire types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArraySelection {
    /// Inclusive index range over virtual rows.
    Range {
        first_index: usize,
        last_index: usize,
    },
    Indices {
        indices: Vec<usize>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnValuesRequest {
    pub column_index: usize,
    #[serde(flatten)]
    pub selection: ArraySelection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSelection {
    SingleCell {
        row_index: usize,
        column_index: usize,
    },
    CellRange {
        first_row_index: usize,
        last_row_index: usize,
        first_column_index: usize,
        last_column_index: usize,
    },
    RowRange {
        first_index: usize,
        last_index: usize,
    },
    ColumnRange {
        first_index: usize,
        last_index: usize,
    },
    RowIndices {
        indices: Vec<usize>,
    },
    ColumnIndices {
        indices: Vec<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Tsv,
    Html,
}

// ===== State reporting =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TableShape {
    pub num_rows: usize,
    pub num_columns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedFeatures {
    pub search_schema: bool,
    pub set_row_filters: bool,
    pub set_sort_columns: bool,
    pub get_column_profiles: bool,
    pub export_data_selection: bool,
    pub convert_to_code: bool,
}

impl Default for SupportedFeatures {
    fn default() -> Self {
        SupportedFeatures {
            search_schema: true,
            set_row_filters: true,
            set_sort_columns: true,
            get_column_profiles: true,
            export_data_selection: true,
            convert_to_code: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendState {
    pub display_name: String,
    pub table_shape: TableShape,
    pub table_unfiltered_shape: TableShape,
    pub row_filters: Vec<RowFilter>,
    pub sort_keys: Vec<ColumnSortKey>,
    pub has_row_labels: bool,
    pub supported_features: SupportedFeatures,
}

// ===== The view =====

/// Virtual row mapping: `filtered` after the filter fold, `ordered` after
/// the sort pass. Both hold physical row positions.
#[derive(Debug, Clone, Default)]
pub struct VirtualOrdering {
    pub filtered: Vec<usize>,
    pub ordered: Vec<usize>,
}

pub struct TableView {
    backing: Arc<Backing>,
    display_name: String,
    row_filters: Vec<RowFilter>,
    sort_keys: Vec<ColumnSortKey>,
    ordering: VirtualOrdering,
    dirty: bool,
    had_errors: bool,
    cached_schema: Option<Vec<ColumnSchema>>,
}

impl TableView {
    pub fn new(display_name: String, backing: Arc<Backing>) -> Self {
        TableView {
            backing,
            display_name,
            row_filters: Vec::new(),
            sort_keys: Vec::new(),
            ordering: VirtualOrdering::default(),
            dirty: true,
            had_errors: false,
            cached_schema: None,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn backing(&self) -> &Arc<Backing> {
        &self.backing
    }

    pub fn row_filters(&self) -> &[RowFilter] {
        &self.row_filters
    }

    pub fn sort_keys(&self) -> &[ColumnSortKey] {
        &self.sort_keys
    }

    /// Flag the ordering for recomputation without touching view state.
    /// Used when the host reports a possible in-place mutation.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Swap in a new backing table after the bound variable was reassigned.
    /// The caller runs schema reconciliation separately when needed.
    pub fn replace_backing(&mut self, backing: Arc<Backing>) {
        self.backing = backing;
        self.cached_schema = None;
        self.dirty = true;
    }

    /// Rebuild the virtual ordering if anything invalidated it.
    fn ensure_ordering(&mut self) {
        if !self.dirty {
            return;
        }
        let (filtered, had_errors) = apply_row_filters(&self.backing, &mut self.row_filters);
        let ordered = match sort_indices(&self.backing, &filtered, &self.sort_keys) {
            Ok(ordered) => ordered,
            Err(message) => {
                // A stale sort key never aborts the pipeline
                warn!("sort skipped for '{}': {}", self.display_name, message);
                filtered.clone()
            }
        };
        self.ordering = VirtualOrdering { filtered, ordered };
        self.had_errors = had_errors;
        self.dirty = false;
    }

    /// Physical rows in virtual order, recomputing first when dirty.
    pub fn ordering(&mut self) -> &VirtualOrdering {
        self.ensure_ordering();
        &self.ordering
    }

    pub fn virtual_row_count(&mut self) -> usize {
        self.ordering().ordered.len()
    }

    // ===== Schema operations =====

    /// Full schema, cached only for wide tables where recomputing per
    /// request would dominate.
    fn schema_snapshot(&mut self) -> Vec<ColumnSchema> {
        if self.backing.num_columns() > SCHEMA_CACHE_THRESHOLD {
            if self.cached_schema.is_none() {
                self.cached_schema = Some(full_schema(&self.backing));
            }
            self.cached_schema.clone().unwrap_or_default()
        } else {
            full_schema(&self.backing)
        }
    }

    pub fn get_schema(&mut self, column_indices: &[usize]) -> Vec<ColumnSchema> {
        if self.backing.num_columns() > SCHEMA_CACHE_THRESHOLD {
            let snapshot = self.schema_snapshot();
            column_indices
                .iter()
                .filter_map(|&i| snapshot.get(i).cloned())
                .collect()
        } else {
            schema_for_indices(&self.backing, column_indices)
        }
    }

    pub fn search_schema(
        &mut self,
        filters: &[SchemaFilter],
        start_index: usize,
        max_results: usize,
    ) -> (Vec<ColumnSchema>, usize) {
        let snapshot = self.schema_snapshot();
        search_schema(&snapshot, filters, start_index, max_results)
    }

    pub fn get_state(&mut self) -> BackendState {
        let unfiltered = TableShape {
            num_rows: self.backing.num_rows(),
            num_columns: self.backing.num_columns(),
        };
        let filtered_rows = self.virtual_row_count();
        BackendState {
            display_name: self.display_name.clone(),
            table_shape: TableShape {
                num_rows: filtered_rows,
                num_columns: unfiltered.num_columns,
            },
            table_unfiltered_shape: unfiltered,
            row_filters: self.row_filters.clone(),
            sort_keys: self.sort_keys.clone(),
            has_row_labels: self.backing.has_row_labels(),
            supported_features: SupportedFeatures::default(),
        }
    }

    // ===== State mutation =====

    /// Replace the filter list wholesale and recompute eagerly so validity
    /// and the row count are known now, not at the next data request.
    pub fn set_row_filters(&mut self, filters: Vec<RowFilter>) -> FilterResult {
        self.row_filters = filters;
        self.dirty = true;
        self.ensure_ordering();
        FilterResult {
            selected_num_rows: self.ordering.filtered.len(),
            had_errors: self.had_errors,
        }
    }

    pub fn set_sort_columns(&mut self, sort_keys: Vec<ColumnSortKey>) {
        self.sort_keys = sort_keys;
        self.dirty = true;
    }

    /// Rebind filters and sort keys after a schema change. `previous` is
    /// the schema snapshot taken before the backing table was replaced.
    pub fn reconcile(&mut self, previous: &[ColumnSchema]) {
        self.cached_schema = None;
        let current = full_schema(&self.backing);
        crate::schema::reconcile_state(
            &mut self.row_filters,
            &mut self.sort_keys,
            previous,
            &current,
        );
        self.dirty = true;
    }

    // ===== Data access =====

    fn resolve_selection(&mut self, selection: &ArraySelection) -> Vec<usize> {
        let ordered = &self.ordering().ordered;
        match selection {
            ArraySelection::Range {
                first_index,
                last_index,
            } => {
                if *first_index >= ordered.len() {
                    return Vec::new();
                }
                let last = (*last_index).min(ordered.len() - 1);
                ordered[*first_index..=last].to_vec()
            }
            ArraySelection::Indices { indices } => indices
                .iter()
                .filter_map(|&i| ordered.get(i).copied())
                .collect(),
        }
    }

    /// Formatted values for the selected virtual rows of each requested
    /// column. Out-of-range columns produce an empty list, not an error.
    pub fn get_data_values(
        &mut self,
        requests: &[ColumnValuesRequest],
        options: &FormatOptions,
    ) -> Vec<Vec<String>> {
        let mut out = Vec::with_capacity(requests.len());
        for request in requests {
            let physical_rows = self.resolve_selection(&request.selection);
            let column = match self.backing.column(request.column_index) {
                Ok(c) => c,
                Err(_) => {
                    out.push(Vec::new());
                    continue;
                }
            };
            let values = physical_rows
                .iter()
                .map(|&r| match column.get_ref(r) {
                    Some(cell) => format_value(cell, options),
                    None => crate::format::NULL_TOKEN.to_string(),
                })
                .collect();
            out.push(values);
        }
        out
    }

    /// Formatted row labels for a selection, one inner list per label
    /// level. Tables carry at most one level, so the result is empty or a
    /// single list.
    pub fn get_row_labels(
        &mut self,
        selection: &ArraySelection,
        options: &FormatOptions,
    ) -> Vec<Vec<String>> {
        let physical_rows = self.resolve_selection(selection);
        let labels = match self.backing.row_labels() {
            Some(labels) => labels,
            None => return Vec::new(),
        };
        let level = physical_rows
            .iter()
            .map(|&r| match labels.get_ref(r) {
                Some(cell) => format_value(cell, options),
                None => crate::format::NULL_TOKEN.to_string(),
            })
            .collect();
        vec![level]
    }

    // ===== Export =====

    /// Serialize a selection as csv, tsv, or html, reading through the
    /// virtual ordering.
    pub fn export_data_selection(
        &mut self,
        selection: &DataSelection,
        format: ExportFormat,
        options: &FormatOptions,
    ) -> Result<String, String> {
        let num_columns = self.backing.num_columns();
        let virtual_rows = self.virtual_row_count();
        let all_rows: Vec<usize> = (0..virtual_rows).collect();
        let all_columns: Vec<usize> = (0..num_columns).collect();

        let (row_positions, column_indices, with_header) = match selection {
            DataSelection::SingleCell {
                row_index,
                column_index,
            } => (vec![*row_index], vec![*column_index], false),
            DataSelection::CellRange {
                first_row_index,
                last_row_index,
                first_column_index,
                last_column_index,
            } => (
                clamp_range(*first_row_index, *last_row_index, virtual_rows),
                clamp_range(*first_column_index, *last_column_index, num_columns),
                true,
            ),
            DataSelection::RowRange {
                first_index,
                last_index,
            } => (
                clamp_range(*first_index, *last_index, virtual_rows),
                all_columns,
                true,
            ),
            DataSelection::ColumnRange {
                first_index,
                last_index,
            } => (
                all_rows,
                clamp_range(*first_index, *last_index, num_columns),
                true,
            ),
            DataSelection::RowIndices { indices } => (
                indices
                    .iter()
                    .copied()
                    .filter(|&i| i < virtual_rows)
                    .collect(),
                all_columns,
                true,
            ),
            DataSelection::ColumnIndices { indices } => (
                all_rows,
                indices
                    .iter()
                    .copied()
                    .filter(|&i| i < num_columns)
                    .collect(),
                true,
            ),
        };

        let ordered = self.ordering().ordered.clone();
        let mut header = Vec::with_capacity(column_indices.len());
        for &ci in &column_indices {
            header.push(self.backing.column(ci)?.name().to_string());
        }
        let mut grid: Vec<Vec<String>> = Vec::with_capacity(row_positions.len());
        for &vrow in &row_positions {
            let physical = *ordered
                .get(vrow)
                .ok_or_else(|| format!("row {} out of range [0, {})", vrow, ordered.len()))?;
            let mut row = Vec::with_capacity(column_indices.len());
            for &ci in &column_indices {
                let column = self.backing.column(ci)?;
                row.push(match column.get_ref(physical) {
                    Some(cell) => format_value(cell, options),
                    None => crate::format::NULL_TOKEN.to_string(),
                });
            }
            grid.push(row);
        }

        Ok(match format {
            ExportFormat::Csv => render_delimited(&header, &grid, ',', with_header),
            ExportFormat::Tsv => render_delimited(&header, &grid, '\t', with_header),
            ExportFormat::Html => render_html(&header, &grid, with_header),
        })
    }

}

fn clamp_range(first: usize, last: usize, len: usize) -> Vec<usize> {
    if len == 0 || first >= len {
        return Vec::new();
    }
    (first..=last.min(len - 1)).collect()
}

fn escape_delimited(value: &str, sep: char) -> String {
    if value.contains(sep) || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn render_delimited(
    header: &[String],
    grid: &[Vec<String>],
    sep: char,
    with_header: bool,
) -> String {
    let mut lines = Vec::with_capacity(grid.len() + 1);
    if with_header {
        lines.push(
            header
                .iter()
                .map(|h| escape_delimited(h, sep))
                .collect::<Vec<_>>()
                .join(&sep.to_string()),
        );
    }
    for row in grid {
        lines.push(
            row.iter()
                .map(|v| escape_delimited(v, sep))
                .collect::<Vec<_>>()
                .join(&sep.to_string()),
        );
    }
    lines.join("\n")
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn render_html(header: &[String], grid: &[Vec<String>], with_header: bool) -> String {
    let mut out = String::from("<table>");
    if with_header {
        out.push_str("<thead><tr>");
        for h in header {
            out.push_str(&format!("<th>{}</th>", escape_html(h)));
        }
        out.push_str("</tr></thead>");
    }
    out.push_str("<tbody>");
    for row in grid {
        out.push_str("<tr>");
        for v in row {
            out.push_str(&format!("<td>{}</td>", escape_html(v)));
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table>");
    out
}
