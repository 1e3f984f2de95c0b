/// Explorer Session Example
///
/// This example demonstrates:
/// - Registering a frame with the explorer service
/// - Filtering and sorting through the JSON-RPC interface
/// - Paging formatted values over the virtual ordering
/// - Exporting a selection as csv

use std::sync::Arc;
use tablescope::*;

fn build_frame() -> Arc<Backing> {
    let city = Column::from_values(
        "city".to_string(),
        ColumnType::String,
        vec![
            ColumnValue::String("Lisbon".to_string()),
            ColumnValue::String("Oslo".to_string()),
            ColumnValue::String("Kyoto".to_string()),
            ColumnValue::String("Quito".to_string()),
            ColumnValue::String("Perth".to_string()),
        ],
    )
    .unwrap();
    let population = Column::from_values(
        "population".to_string(),
        ColumnType::Int64,
        vec![
            ColumnValue::Int64(545_000),
            ColumnValue::Int64(709_000),
            ColumnValue::Int64(1_464_000),
            ColumnValue::Int64(1_763_000),
            ColumnValue::Int64(2_118_000),
        ],
    )
    .unwrap();
    let rainfall_mm = Column::from_values(
        "rainfall_mm".to_string(),
        ColumnType::Float64,
        vec![
            ColumnValue::Float64(774.0),
            ColumnValue::Float64(763.0),
            ColumnValue::Float64(1574.0),
            ColumnValue::Float64(1116.0),
            ColumnValue::Float64(734.0),
        ],
    )
    .unwrap();
    let table = Table::new(
        "cities".to_string(),
        vec![city, population, rainfall_mm],
    )
    .unwrap();
    Arc::new(Backing::Frame(table))
}

fn main() {
    let mut service = DataExplorerService::new(2);
    let comm_id = service.register_table("cities".to_string(), build_frame(), None);
    println!("opened view: {}", comm_id);

    // Keep cities with population over a million.
    let request = serde_json::json!({
        "comm_id": comm_id,
        "method": "set_row_filters",
        "params": {
            "filters": [{
                "filter_id": "f0",
                "condition": "and",
                "column_schema": {
                    "column_name": "population",
                    "column_index": 1,
                    "type_name": "int64",
                    "type_display": "number"
                },
                "filter_type": "compare",
                "op": ">",
                "value": "1000000"
            }]
        }
    });
    let response = service.handle_raw_request(&request.to_string());
    println!("filter result: {}", serde_json::to_string(&response).unwrap());

    // Sort the survivors by rainfall, wettest first.
    let request = serde_json::json!({
        "comm_id": comm_id,
        "method": "set_sort_columns",
        "params": {
            "sort_keys": [{"column_index": 2, "ascending": false}]
        }
    });
    service.handle_raw_request(&request.to_string());

    // Page the first column through the virtual ordering.
    let request = serde_json::json!({
        "comm_id": comm_id,
        "method": "get_data_values",
        "params": {
            "columns": [
                {"column_index": 0, "kind": "range", "first_index": 0, "last_index": 9}
            ],
            "format_options": {"thousands_sep": ","}
        }
    });
    let response = service.handle_raw_request(&request.to_string());
    println!("values: {}", serde_json::to_string(&response).unwrap());

    // Export everything that is visible as csv.
    let request = serde_json::json!({
        "comm_id": comm_id,
        "method": "export_data_selection",
        "params": {
            "selection": {"kind": "row_range", "first_index": 0, "last_index": 9},
            "format": "csv",
            "format_options": {}
        }
    });
    let response = service.handle_raw_request(&request.to_string());
    println!("export: {}", serde_json::to_string(&response).unwrap());

    // The same view configuration rendered as pandas code.
    let request = serde_json::json!({
        "comm_id": comm_id,
        "method": "get_state",
        "params": {}
    });
    let response = service.handle_raw_request(&request.to_string());
    println!("state: {}", serde_json::to_string(&response).unwrap());
}
