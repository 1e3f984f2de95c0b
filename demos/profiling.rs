/// Column Profiling Example
///
/// This example demonstrates:
/// - Requesting null counts, summary stats, a histogram, and a frequency table
/// - Receiving profile results asynchronously as events
/// - Waiting for the background job queue to drain

use std::sync::Arc;
use tablescope::*;

fn build_frame() -> Arc<Backing> {
    let speeds: Vec<ColumnValue> = (0..200)
        .map(|i| {
            if i % 17 == 0 {
                ColumnValue::Null
            } else {
                ColumnValue::Float64(40.0 + ((i * 13) % 60) as f64)
            }
        })
        .collect();
    let speed = Column::from_values("speed_kmh".to_string(), ColumnType::Float64, speeds).unwrap();

    let roads: Vec<ColumnValue> = (0..200)
        .map(|i| {
            let kind = match i % 5 {
                0 | 1 => "motorway",
                2 => "arterial",
                _ => "residential",
            };
            ColumnValue::String(kind.to_string())
        })
        .collect();
    let road = Column::from_values("road_type".to_string(), ColumnType::String, roads).unwrap();

    let table = Table::new("traffic".to_string(), vec![speed, road]).unwrap();
    Arc::new(Backing::Frame(table))
}

fn main() {
    let mut service = DataExplorerService::new(4);
    let comm_id = service.register_table("traffic".to_string(), build_frame(), None);

    let request = serde_json::json!({
        "comm_id": comm_id,
        "method": "get_column_profiles",
        "params": {
            "callback_id": "profile-1",
            "profiles": [
                {"column_index": 0, "profile_type": "null_count"},
                {"column_index": 0, "profile_type": "summary_stats"},
                {
                    "column_index": 0,
                    "profile_type": "small_histogram",
                    "method": "freedman_diaconis",
                    "num_bins": 20
                },
                {
                    "column_index": 1,
                    "profile_type": "small_frequency_table",
                    "limit": 5
                }
            ],
            "format_options": {}
        }
    });

    // The reply is an empty ack; results arrive later as an event.
    let response = service.handle_raw_request(&request.to_string());
    println!("ack: {}", serde_json::to_string(&response).unwrap());

    service.wait_for_idle();
    for (comm_id, event) in service.take_events() {
        println!(
            "event for {}: {}",
            comm_id,
            serde_json::to_string_pretty(&event).unwrap()
        );
    }
}
