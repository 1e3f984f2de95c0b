/// Data explorer service
///
/// Owns every open table view, keyed by comm id, and routes RPC requests
/// to them. Views may be bound to a variable path in the host namespace;
/// when the host reports a reassignment or possible mutation on a path,
/// the service runs schema-change detection on every view bound at or
/// under that path and queues the matching update event.
///
/// Profile requests are acknowledged synchronously and computed on a
/// background worker pool; finished profiles land in the outbound event
/// queue tagged with the request's callback id.

use crate::codegen::{convert_to_code, CodeSyntax};
use crate::format::FormatOptions;
use crate::jobs::JobQueue;
use crate::keycodec::{encode_path, AccessKey};
use crate::messages::{
    RpcMethod, RpcRequest, RpcResponse, ServerEvent, INTERNAL_ERROR, INVALID_PARAMS,
    METHOD_NOT_FOUND,
};
use crate::profile::{profile_column, ColumnProfileRequest, ColumnProfileResult};
use crate::schema::{classify_change, full_schema, SchemaChange};
use crate::table::Backing;
use crate::view::TableView;
use log::{debug, info};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// How the host observed a bound variable change.
pub enum VariableUpdate {
    /// The variable now refers to a new object.
    Reassigned(Arc<Backing>),
    /// Same object, possibly mutated in place.
    MaybeMutated,
}

pub struct DataExplorerService {
    views: HashMap<String, TableView>,
    /// comm id -> encoded variable path the view is bound to
    bindings: HashMap<String, Vec<String>>,
    jobs: JobQueue,
    events: Arc<Mutex<Vec<(String, ServerEvent)>>>,
    next_comm_id: u64,
}

impl Default for DataExplorerService {
    fn default() -> Self {
        Self::new(2)
    }
}

impl DataExplorerService {
    pub fn new(num_workers: usize) -> Self {
        DataExplorerService {
            views: HashMap::new(),
            bindings: HashMap::new(),
            jobs: JobQueue::new(num_workers),
            events: Arc::new(Mutex::new(Vec::new())),
            next_comm_id: 0,
        }
    }

    /// Open a view over a backing table, optionally bound to a variable
    /// path for change tracking. Returns the new comm id.
    pub fn register_table(
        &mut self,
        display_name: String,
        backing: Arc<Backing>,
        variable_path: Option<&[AccessKey]>,
    ) -> String {
        let comm_id = format!("data-explorer-{}", self.next_comm_id);
        self.next_comm_id += 1;
        if let Some(path) = variable_path {
            self.bindings.insert(comm_id.clone(), encode_path(path));
        }
        info!("opened view '{}' as {}", display_name, comm_id);
        self.views
            .insert(comm_id.clone(), TableView::new(display_name, backing));
        comm_id
    }

    pub fn close_table(&mut self, comm_id: &str) -> bool {
        self.bindings.remove(comm_id);
        let removed = self.views.remove(comm_id).is_some();
        if removed {
            info!("closed view {}", comm_id);
        }
        removed
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    /// Drain the outbound event queue: (comm id, event) pairs in arrival
    /// order.
    pub fn take_events(&self) -> Vec<(String, ServerEvent)> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(_) => Vec::new(),
        }
    }

    /// Block until all queued profile jobs have finished.
    pub fn wait_for_idle(&self) {
        self.jobs.wait_for_all();
    }

    // ===== Variable change tracking =====

    /// Apply a host-reported change to every view bound at or under the
    /// given path.
    pub fn handle_variable_update(&mut self, path: &[AccessKey], update: VariableUpdate) {
        let encoded = encode_path(path);
        let affected: Vec<String> = self
            .bindings
            .iter()
            .filter(|(_, bound)| bound.starts_with(&encoded))
            .map(|(comm_id, _)| comm_id.clone())
            .collect();

        for comm_id in affected {
            let view = match self.views.get_mut(&comm_id) {
                Some(v) => v,
                None => continue,
            };
            match &update {
                VariableUpdate::Reassigned(new_backing) => {
                    let previous = full_schema(view.backing());
                    let change = classify_change(&previous, new_backing);
                    view.replace_backing(Arc::clone(new_backing));
                    let event = match change {
                        SchemaChange::SchemaChanged => {
                            view.reconcile(&previous);
                            ServerEvent::SchemaUpdate
                        }
                        SchemaChange::DataOnly => ServerEvent::DataUpdate,
                    };
                    self.push_event(&comm_id, event);
                }
                VariableUpdate::MaybeMutated => {
                    view.mark_dirty();
                    self.push_event(&comm_id, ServerEvent::DataUpdate);
                }
            }
        }
    }

    fn push_event(&self, comm_id: &str, event: ServerEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((comm_id.to_string(), event));
        }
    }

    // ===== RPC dispatch =====

    /// Parse and dispatch a raw JSON request.
    pub fn handle_raw_request(&mut self, raw: &str) -> RpcResponse {
        match serde_json::from_str::<RpcRequest>(raw) {
            Ok(request) => self.handle_request(request),
            Err(e) => RpcResponse::error(METHOD_NOT_FOUND, format!("unrecognized request: {}", e)),
        }
    }

    pub fn handle_request(&mut self, request: RpcRequest) -> RpcResponse {
        let comm_id = request.comm_id.clone();
        let view = match self.views.get_mut(&comm_id) {
            Some(v) => v,
            None => {
                return RpcResponse::error(INVALID_PARAMS, format!("unknown comm id '{}'", comm_id))
            }
        };
        debug!("dispatching request for {}", comm_id);

        match request.method {
            RpcMethod::GetSchema { column_indices } => {
                let columns = view.get_schema(&column_indices);
                to_result(json!({ "columns": columns }))
            }
            RpcMethod::SearchSchema {
                filters,
                start_index,
                max_results,
            } => {
                let (matches, total) = view.search_schema(&filters, start_index, max_results);
                to_result(json!({ "matches": matches, "total_num_matches": total }))
            }
            RpcMethod::GetState {} => match serde_json::to_value(view.get_state()) {
                Ok(state) => RpcResponse::ok(state),
                Err(e) => RpcResponse::error(INTERNAL_ERROR, e.to_string()),
            },
            RpcMethod::SetRowFilters { filters } => {
                let result = view.set_row_filters(filters);
                to_result(json!(result))
            }
            RpcMethod::SetSortColumns { sort_keys } => {
                view.set_sort_columns(sort_keys);
                RpcResponse::ok(json!({}))
            }
            RpcMethod::GetDataValues {
                columns,
                format_options,
            } => {
                let values = view.get_data_values(&columns, &format_options);
                to_result(json!({ "columns": values }))
            }
            RpcMethod::GetRowLabels {
                selection,
                format_options,
            } => {
                let labels = view.get_row_labels(&selection, &format_options);
                to_result(json!({ "row_labels": labels }))
            }
            RpcMethod::ExportDataSelection {
                selection,
                format,
                format_options,
            } => match view.export_data_selection(&selection, format, &format_options) {
                Ok(data) => to_result(json!({ "data": data, "format": format })),
                Err(message) => RpcResponse::error(INVALID_PARAMS, message),
            },
            RpcMethod::GetColumnProfiles {
                callback_id,
                profiles,
                format_options,
            } => self.enqueue_profiles(&comm_id, callback_id, profiles, format_options),
            RpcMethod::ConvertToCode {
                column_filters: _,
                row_filters,
                sort_keys,
                code_syntax_name,
            } => {
                let syntax = match CodeSyntax::from_name(&code_syntax_name) {
                    Ok(s) => s,
                    Err(message) => return RpcResponse::error(INVALID_PARAMS, message),
                };
                let names: Vec<String> = full_schema(view.backing())
                    .into_iter()
                    .map(|c| c.column_name)
                    .collect();
                let code = convert_to_code(&row_filters, &sort_keys, &names, syntax);
                to_result(json!(code))
            }
        }
    }

    /// Acknowledge now, compute later. The worker reads a frozen copy of
    /// the filtered row set, so a concurrent state change cannot skew a
    /// running profile.
    fn enqueue_profiles(
        &mut self,
        comm_id: &str,
        callback_id: String,
        profiles: Vec<ColumnProfileRequest>,
        format_options: FormatOptions,
    ) -> RpcResponse {
        let view = match self.views.get_mut(comm_id) {
            Some(v) => v,
            None => {
                return RpcResponse::error(INVALID_PARAMS, format!("unknown comm id '{}'", comm_id))
            }
        };
        let backing = Arc::clone(view.backing());
        let rows = view.ordering().filtered.clone();
        let events = Arc::clone(&self.events);
        let comm_id = comm_id.to_string();

        let submitted = self.jobs.submit(move || {
            let results: Vec<ColumnProfileResult> = profiles
                .iter()
                .map(|request| profile_column(&backing, &rows, request, &format_options))
                .collect();
            if let Ok(mut events) = events.lock() {
                events.push((
                    comm_id,
                    ServerEvent::ReturnColumnProfiles {
                        callback_id,
                        profiles: results,
                    },
                ));
            }
        });
        match submitted {
            Ok(()) => RpcResponse::ok(json!({})),
            Err(message) => RpcResponse::error(INTERNAL_ERROR, message),
        }
    }
}

fn to_result(value: serde_json::Value) -> RpcResponse {
    RpcResponse::ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, ColumnType, ColumnValue};
    use crate::profile::ProfileKind;
    use crate::table::Table;

    fn fixture_backing() -> Arc<Backing> {
        let a = Column::from_values(
            "a".to_string(),
            ColumnType::Int64,
            (1..=5).map(ColumnValue::Int64).collect(),
        )
        .unwrap();
        Arc::new(Backing::Frame(Table::new("df".to_string(), vec![a]).unwrap()))
    }

    fn result_json(response: RpcResponse) -> serde_json::Value {
        match response {
            RpcResponse::Result { result } => result,
            RpcResponse::Error { error } => panic!("unexpected rpc error: {}", error.message),
        }
    }

    #[test]
    fn test_register_and_fetch_data() {
        let mut service = DataExplorerService::new(1);
        let comm_id = service.register_table("df".to_string(), fixture_backing(), None);

        let raw = format!(
            r#"{{
                "comm_id": "{}",
                "method": "get_data_values",
                "params": {{
                    "columns": [{{"column_index": 0, "kind": "range", "first_index": 0, "last_index": 4}}],
                    "format_options": {{}}
                }}
            }}"#,
            comm_id
        );
        let result = result_json(service.handle_raw_request(&raw));
        assert_eq!(result["columns"][0][0], "1");
        assert_eq!(result["columns"][0][4], "5");
    }

    #[test]
    fn test_row_labels_rpc_nests_label_levels() {
        let mut service = DataExplorerService::new(1);
        let values = Column::from_values(
            "a".to_string(),
            ColumnType::Int64,
            vec![ColumnValue::Int64(1), ColumnValue::Int64(2)],
        )
        .unwrap();
        let labels = Column::from_values(
            "index".to_string(),
            ColumnType::String,
            vec![
                ColumnValue::String("r0".to_string()),
                ColumnValue::String("r1".to_string()),
            ],
        )
        .unwrap();
        let backing = Arc::new(Backing::Frame(
            Table::with_row_labels("df".to_string(), vec![values], Some(labels)).unwrap(),
        ));
        let comm_id = service.register_table("df".to_string(), backing, None);
        let raw = format!(
            r#"{{
                "comm_id": "{}",
                "method": "get_row_labels",
                "params": {{
                    "selection": {{"kind": "range", "first_index": 0, "last_index": 1}},
                    "format_options": {{}}
                }}
            }}"#,
            comm_id
        );
        let result = result_json(service.handle_raw_request(&raw));
        // One inner list per label level
        assert_eq!(result["row_labels"], json!([["r0", "r1"]]));
    }

    #[test]
    fn test_unknown_comm_id() {
        let mut service = DataExplorerService::new(1);
        let response = service.handle_raw_request(
            r#"{"comm_id": "nope", "method": "get_state", "params": {}}"#,
        );
        match response {
            RpcResponse::Error { error } => assert_eq!(error.code, INVALID_PARAMS),
            RpcResponse::Result { .. } => panic!("expected an error"),
        }
    }

    #[test]
    fn test_unrecognized_method() {
        let mut service = DataExplorerService::new(1);
        let comm_id = service.register_table("df".to_string(), fixture_backing(), None);
        let raw = format!(
            r#"{{"comm_id": "{}", "method": "frobnicate", "params": {{}}}}"#,
            comm_id
        );
        match service.handle_raw_request(&raw) {
            RpcResponse::Error { error } => assert_eq!(error.code, METHOD_NOT_FOUND),
            RpcResponse::Result { .. } => panic!("expected an error"),
        }
    }

    #[test]
    fn test_profiles_arrive_as_events() {
        let mut service = DataExplorerService::new(1);
        let comm_id = service.register_table("df".to_string(), fixture_backing(), None);
        let request = RpcRequest {
            comm_id: comm_id.clone(),
            method: RpcMethod::GetColumnProfiles {
                callback_id: "cb-1".to_string(),
                profiles: vec![ColumnProfileRequest {
                    column_index: 0,
                    kind: ProfileKind::NullCount,
                }],
                format_options: FormatOptions::default(),
            },
        };
        // Synchronous ack is empty
        let ack = result_json(service.handle_request(request));
        assert_eq!(ack, json!({}));

        service.wait_for_idle();
        let events = service.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, comm_id);
        match &events[0].1 {
            ServerEvent::ReturnColumnProfiles {
                callback_id,
                profiles,
            } => {
                assert_eq!(callback_id, "cb-1");
                assert_eq!(profiles[0].null_count, Some(0));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        // Queue drained
        assert!(service.take_events().is_empty());
    }

    #[test]
    fn test_reassignment_schema_change() {
        let mut service = DataExplorerService::new(1);
        let path = vec![AccessKey::Str("df".to_string())];
        let comm_id = service.register_table("df".to_string(), fixture_backing(), Some(&path));

        // New object with a different column set
        let renamed = Arc::new(Backing::Frame(
            Table::new(
                "df".to_string(),
                vec![Column::from_values(
                    "z".to_string(),
                    ColumnType::Int64,
                    vec![ColumnValue::Int64(1)],
                )
                .unwrap()],
            )
            .unwrap(),
        ));
        service.handle_variable_update(&path, VariableUpdate::Reassigned(renamed));
        let events = service.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, comm_id);
        assert!(matches!(events[0].1, ServerEvent::SchemaUpdate));
    }

    #[test]
    fn test_reassignment_data_only() {
        let mut service = DataExplorerService::new(1);
        let path = vec![AccessKey::Str("df".to_string())];
        service.register_table("df".to_string(), fixture_backing(), Some(&path));

        // Same shape, different values
        let same_shape = Arc::new(Backing::Frame(
            Table::new(
                "df".to_string(),
                vec![Column::from_values(
                    "a".to_string(),
                    ColumnType::Int64,
                    vec![ColumnValue::Int64(9)],
                )
                .unwrap()],
            )
            .unwrap(),
        ));
        service.handle_variable_update(&path, VariableUpdate::Reassigned(same_shape));
        let events = service.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].1, ServerEvent::DataUpdate));
    }

    #[test]
    fn test_update_ignores_unbound_paths() {
        let mut service = DataExplorerService::new(1);
        let path = vec![AccessKey::Str("df".to_string())];
        service.register_table("df".to_string(), fixture_backing(), Some(&path));
        let other = vec![AccessKey::Str("other".to_string())];
        service.handle_variable_update(&other, VariableUpdate::MaybeMutated);
        assert!(service.take_events().is_empty());
    }

    #[test]
    fn test_prefix_matching_reaches_nested_binding() {
        let mut service = DataExplorerService::new(1);
        let nested = vec![
            AccessKey::Str("container".to_string()),
            AccessKey::Int(0),
        ];
        service.register_table("container[0]".to_string(), fixture_backing(), Some(&nested));
        // Updating the parent variable touches the nested view
        let parent = vec![AccessKey::Str("container".to_string())];
        service.handle_variable_update(&parent, VariableUpdate::MaybeMutated);
        let events = service.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].1, ServerEvent::DataUpdate));
    }

    #[test]
    fn test_close_table() {
        let mut service = DataExplorerService::new(1);
        let comm_id = service.register_table("df".to_string(), fixture_backing(), None);
        assert_eq!(service.num_views(), 1);
        assert!(service.close_table(&comm_id));
        assert!(!service.close_table(&comm_id));
        assert_eq!(service.num_views(), 0);
    }

    #[test]
    fn test_convert_to_code_rpc() {
        let mut service = DataExplorerService::new(1);
        let comm_id = service.register_table("df".to_string(), fixture_backing(), None);
        let raw = format!(
            r#"{{
                "comm_id": "{}",
                "method": "convert_to_code",
                "params": {{
                    "row_filters": [],
                    "sort_keys": [{{"column_index": 0, "ascending": true}}],
                    "code_syntax_name": "pandas"
                }}
            }}"#,
            comm_id
        );
        let result = result_json(service.handle_raw_request(&raw));
        assert_eq!(
            result["converted_code"][0],
            "df = df.sort_values(by=['a'], ascending=[True])"
        );
    }
}
