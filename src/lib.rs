/// TableScope - Virtual Table Views for Interactive Data Exploration
///
/// Wraps in-memory tabular data (frames, series, arrays) in virtual views
/// that support row filtering, multi-key sorting, column profiling, and
/// paged value retrieval over a JSON-RPC protocol.

pub mod column;
pub mod table;
pub mod keycodec;
pub mod format;
pub mod filter;
pub mod sort;
pub mod schema;
pub mod profile;
pub mod jobs;
pub mod codegen;
pub mod view;
pub mod messages;
pub mod service;

pub use column::{Column, ColumnType, ColumnValue, DisplayType};
pub use table::{Backing, Table};
pub use keycodec::AccessKey;
pub use format::FormatOptions;
pub use filter::{FilterKind, FilterResult, RowFilter};
pub use sort::ColumnSortKey;
pub use schema::{ColumnSchema, SchemaChange};
pub use profile::{ColumnProfileRequest, ColumnProfileResult};
pub use view::{BackendState, DataSelection, ExportFormat, TableView};
pub use messages::{RpcMethod, RpcRequest, RpcResponse, ServerEvent};
pub use service::{DataExplorerService, VariableUpdate};

// Python bindings - only when python feature is enabled
#[cfg(feature = "python")]
mod python_bindings;
#[cfg(feature = "python")]
pub use python_bindings::*;

// WebSocket server modules - only when server feature is enabled
#[cfg(feature = "server")]
pub mod websocket;
#[cfg(feature = "server")]
pub mod server;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::filter::{CompareFilterOp, FilterCondition};
    use serde_json::json;
    use std::sync::Arc;

    fn sales_backing() -> Arc<Backing> {
        let product = Column::from_values(
            "product".to_string(),
            ColumnType::String,
            vec![
                ColumnValue::String("Widget".to_string()),
                ColumnValue::String("Gadget".to_string()),
                ColumnValue::String("Doohickey".to_string()),
                ColumnValue::String("Widget".to_string()),
            ],
        )
        .unwrap();
        let quantity = Column::from_values(
            "quantity".to_string(),
            ColumnType::Int64,
            vec![
                ColumnValue::Int64(10),
                ColumnValue::Int64(5),
                ColumnValue::Int64(15),
                ColumnValue::Int64(2),
            ],
        )
        .unwrap();
        let price = Column::from_values(
            "price".to_string(),
            ColumnType::Float64,
            vec![
                ColumnValue::Float64(9.99),
                ColumnValue::Float64(19.99),
                ColumnValue::Float64(4.99),
                ColumnValue::Float64(9.99),
            ],
        )
        .unwrap();
        let table = Table::new("sales".to_string(), vec![product, quantity, price]).unwrap();
        Arc::new(Backing::Frame(table))
    }

    fn call(service: &mut DataExplorerService, request: serde_json::Value) -> serde_json::Value {
        let response = service.handle_raw_request(&request.to_string());
        serde_json::to_value(&response).unwrap()
    }

    fn compare_filter(column: &Column, index: usize, op: CompareFilterOp, value: &str) -> RowFilter {
        RowFilter {
            filter_id: format!("f{index}"),
            condition: FilterCondition::And,
            column_schema: ColumnSchema::from_column(column, index),
            kind: FilterKind::Compare {
                op,
                value: value.to_string(),
            },
            is_valid: true,
            error_message: None,
        }
    }

    #[test]
    fn test_complete_workflow() {
        let backing = sales_backing();
        let mut view = TableView::new("sales".to_string(), backing.clone());

        // Filter to quantity >= 5, sort by price descending.
        let quantity = backing.column(1).unwrap();
        let result =
            view.set_row_filters(vec![compare_filter(quantity, 1, CompareFilterOp::GtEq, "5")]);
        assert_eq!(result.selected_num_rows, 3);
        assert!(!result.had_errors);

        view.set_sort_columns(vec![ColumnSortKey {
            column_index: 2,
            ascending: false,
        }]);

        let values = view.get_data_values(
            &[crate::view::ColumnValuesRequest {
                column_index: 0,
                selection: crate::view::ArraySelection::Range {
                    first_index: 0,
                    last_index: 2,
                },
            }],
            &FormatOptions::default(),
        );
        assert_eq!(
            values,
            vec![vec![
                "Gadget".to_string(),
                "Widget".to_string(),
                "Doohickey".to_string()
            ]]
        );

        let state = view.get_state();
        assert_eq!(state.table_shape.num_rows, 3);
        assert_eq!(state.table_unfiltered_shape.num_rows, 4);
        assert_eq!(state.row_filters.len(), 1);
        assert_eq!(state.sort_keys.len(), 1);
    }

    #[test]
    fn test_service_rpc_round_trip() {
        let mut service = DataExplorerService::new(1);
        let comm_id = service.register_table("sales".to_string(), sales_backing(), None);

        let request = json!({
            "comm_id": comm_id,
            "method": "set_row_filters",
            "params": {
                "filters": [{
                    "filter_id": "f0",
                    "condition": "and",
                    "column_schema": {
                        "column_name": "price",
                        "column_index": 2,
                        "type_name": "float64",
                        "type_display": "number"
                    },
                    "filter_type": "compare",
                    "op": "<",
                    "value": "10"
                }]
            }
        });
        let parsed = call(&mut service, request);
        assert_eq!(parsed["result"]["selected_num_rows"], 3);

        let request = json!({
            "comm_id": comm_id,
            "method": "get_data_values",
            "params": {
                "columns": [
                    {"column_index": 1, "kind": "range", "first_index": 0, "last_index": 10}
                ],
                "format_options": {}
            }
        });
        let parsed = call(&mut service, request);
        assert_eq!(parsed["result"]["columns"][0], json!(["10", "15", "2"]));
    }

    #[test]
    fn test_profiles_delivered_through_job_queue() {
        let mut service = DataExplorerService::new(2);
        let comm_id = service.register_table("sales".to_string(), sales_backing(), None);

        let request = json!({
            "comm_id": comm_id,
            "method": "get_column_profiles",
            "params": {
                "callback_id": "cb-1",
                "profiles": [
                    {"column_index": 1, "profile_type": "null_count"},
                    {"column_index": 2, "profile_type": "summary_stats"}
                ],
                "format_options": {}
            }
        });
        let parsed = call(&mut service, request);
        assert_eq!(parsed["result"], json!({}));

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
                assert_eq!(profiles.len(), 2);
                assert_eq!(profiles[0].null_count, Some(0));
                assert!(profiles[1].summary_stats.is_some());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_variable_reassignment_revalidates_filters() {
        let mut service = DataExplorerService::new(1);
        let path = vec![AccessKey::Str("sales".to_string())];
        let comm_id = service.register_table("sales".to_string(), sales_backing(), Some(&path));

        // Filter on the price column, then reassign with price renamed.
        let request = json!({
            "comm_id": comm_id,
            "method": "set_row_filters",
            "params": {
                "filters": [{
                    "filter_id": "f0",
                    "condition": "and",
                    "column_schema": {
                        "column_name": "price",
                        "column_index": 2,
                        "type_name": "float64",
                        "type_display": "number"
                    },
                    "filter_type": "compare",
                    "op": ">",
                    "value": "5"
                }]
            }
        });
        call(&mut service, request);

        let cost = Column::from_values(
            "cost".to_string(),
            ColumnType::Float64,
            vec![ColumnValue::Float64(1.0), ColumnValue::Float64(2.0)],
        )
        .unwrap();
        let table = Table::new("sales".to_string(), vec![cost]).unwrap();
        service.handle_variable_update(
            &[AccessKey::Str("sales".to_string())],
            VariableUpdate::Reassigned(Arc::new(Backing::Frame(table))),
        );

        let events = service.take_events();
        assert!(events
            .iter()
            .any(|(_, e)| matches!(e, ServerEvent::SchemaUpdate)));

        let request = json!({"comm_id": comm_id, "method": "get_state", "params": {}});
        let parsed = call(&mut service, request);
        assert_eq!(parsed["result"]["row_filters"][0]["is_valid"], false);
    }
}
