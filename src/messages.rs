/// RPC message types for client-backend communication
use crate::filter::RowFilter;
use crate::profile::{ColumnProfileRequest, ColumnProfileResult};
use crate::schema::SchemaFilter;
use crate::sort::ColumnSortKey;
use crate::view::{ArraySelection, ColumnValuesRequest, DataSelection, ExportFormat};
use crate::format::FormatOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// One JSON-RPC request addressed to a table comm.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub comm_id: String,
    #[serde(flatten)]
    pub method: RpcMethod,
}

/// Requests sent from client to backend
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum RpcMethod {
    /// Schema for specific column indices
    GetSchema { column_indices: Vec<usize> },

    /// Narrowing search over the full schema
    SearchSchema {
        filters: Vec<SchemaFilter>,
        start_index: usize,
        max_results: usize,
    },

    /// Current view state: shapes, filters, sort keys, capabilities.
    /// Braced so that the envelope's empty params object deserializes.
    GetState {},

    /// Replace the row filter list
    SetRowFilters { filters: Vec<RowFilter> },

    /// Replace the sort key list
    SetSortColumns { sort_keys: Vec<ColumnSortKey> },

    /// Formatted cell values over the virtual ordering
    GetDataValues {
        columns: Vec<ColumnValuesRequest>,
        format_options: FormatOptions,
    },

    /// Formatted row labels over the virtual ordering
    GetRowLabels {
        selection: ArraySelection,
        format_options: FormatOptions,
    },

    /// Serialize a selection as csv, tsv, or html
    ExportDataSelection {
        selection: DataSelection,
        format: ExportFormat,
        format_options: FormatOptions,
    },

    /// Enqueue profile computation; results arrive as a later event
    GetColumnProfiles {
        callback_id: String,
        profiles: Vec<ColumnProfileRequest>,
        format_options: FormatOptions,
    },

    /// Render the view configuration as code in a dataframe dialect
    ConvertToCode {
        #[serde(default)]
        column_filters: Vec<JsonValue>,
        row_filters: Vec<RowFilter>,
        sort_keys: Vec<ColumnSortKey>,
        code_syntax_name: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// A reply to one request: either a result payload or an error.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RpcResponse {
    Result { result: JsonValue },
    Error { error: RpcError },
}

impl RpcResponse {
    pub fn ok(result: JsonValue) -> Self {
        RpcResponse::Result { result }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        RpcResponse::Error {
            error: RpcError {
                code,
                message: message.into(),
            },
        }
    }
}

/// Unsolicited events sent from backend to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Column set changed; the client must refetch schema and state
    SchemaUpdate,

    /// Values changed under an unchanged schema
    DataUpdate,

    /// Deferred profile results, correlated by `callback_id`
    ReturnColumnProfiles {
        callback_id: String,
        profiles: Vec<ColumnProfileResult>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let raw = r#"{
            "comm_id": "view-1",
            "method": "get_schema",
            "params": { "column_indices": [0, 2] }
        }"#;
        let request: RpcRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.comm_id, "view-1");
        match request.method {
            RpcMethod::GetSchema { column_indices } => assert_eq!(column_indices, vec![0, 2]),
            other => panic!("unexpected method: {:?}", other),
        }
    }

    #[test]
    fn test_get_state_accepts_empty_params() {
        let raw = r#"{"comm_id": "view-1", "method": "get_state", "params": {}}"#;
        let request: RpcRequest = serde_json::from_str(raw).unwrap();
        assert!(matches!(request.method, RpcMethod::GetState {}));
    }

    #[test]
    fn test_set_row_filters_wire_format() {
        let raw = r#"{
            "comm_id": "view-1",
            "method": "set_row_filters",
            "params": {
                "filters": [{
                    "filter_id": "f1",
                    "condition": "and",
                    "column_schema": {
                        "column_name": "a",
                        "column_index": 0,
                        "type_name": "int64",
                        "type_display": "number"
                    },
                    "filter_type": "compare",
                    "op": ">",
                    "value": "2"
                }]
            }
        }"#;
        let request: RpcRequest = serde_json::from_str(raw).unwrap();
        match request.method {
            RpcMethod::SetRowFilters { filters } => {
                assert_eq!(filters.len(), 1);
                assert!(filters[0].is_valid);
            }
            other => panic!("unexpected method: {:?}", other),
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = ServerEvent::ReturnColumnProfiles {
            callback_id: "cb-7".to_string(),
            profiles: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "return_column_profiles");
        assert_eq!(json["callback_id"], "cb-7");
    }

    #[test]
    fn test_error_response_shape() {
        let response = RpcResponse::error(METHOD_NOT_FOUND, "no such method");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["code"], -32601);
    }
}
