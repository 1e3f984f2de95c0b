/// Python bindings for the data explorer using PyO3
///
/// Exposes the explorer service to Python so a host kernel can register
/// live tables, route RPC requests, and collect update events without
/// leaving the interpreter.

use pyo3::exceptions::{PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use std::sync::{Arc, Mutex};

use crate::column::{days_from_ymd, Column, ColumnType, ColumnValue};
use crate::keycodec::AccessKey;
use crate::messages::RpcResponse;
use crate::service::{DataExplorerService, VariableUpdate};
use crate::table::{Backing, Table};

// ============================================================================
// Python Value Conversions
// ============================================================================

/// Convert a Python datetime.date to days since Unix epoch (1970-01-01)
fn date_to_days_since_epoch(date: &Bound<'_, PyAny>) -> PyResult<i32> {
    let year: i32 = date.getattr("year")?.extract()?;
    let month: u32 = date.getattr("month")?.extract()?;
    let day: u32 = date.getattr("day")?.extract()?;
    Ok(days_from_ymd(year, month, day))
}

/// Convert a Python datetime.datetime to milliseconds since Unix epoch,
/// carrying the tzinfo name when present
fn datetime_to_ms_since_epoch(dt: &Bound<'_, PyAny>) -> PyResult<(i64, Option<String>)> {
    let year: i32 = dt.getattr("year")?.extract()?;
    let month: u32 = dt.getattr("month")?.extract()?;
    let day: u32 = dt.getattr("day")?.extract()?;
    let hour: u32 = dt.getattr("hour")?.extract()?;
    let minute: u32 = dt.getattr("minute")?.extract()?;
    let second: u32 = dt.getattr("second")?.extract()?;
    let microsecond: u32 = dt.getattr("microsecond")?.extract()?;

    let days = days_from_ymd(year, month, day) as i64;
    let ms = days * 24 * 60 * 60 * 1000
        + (hour as i64) * 60 * 60 * 1000
        + (minute as i64) * 60 * 1000
        + (second as i64) * 1000
        + (microsecond as i64) / 1000;

    let tzinfo = dt.getattr("tzinfo")?;
    let timezone = if tzinfo.is_none() {
        None
    } else {
        Some(tzinfo.str()?.extract::<String>()?)
    };
    Ok((ms, timezone))
}

/// Convert a Python datetime.time to milliseconds since midnight
fn time_to_ms(t: &Bound<'_, PyAny>) -> PyResult<i64> {
    let hour: i64 = t.getattr("hour")?.extract()?;
    let minute: i64 = t.getattr("minute")?.extract()?;
    let second: i64 = t.getattr("second")?.extract()?;
    let microsecond: i64 = t.getattr("microsecond")?.extract()?;
    Ok(hour * 3_600_000 + minute * 60_000 + second * 1000 + microsecond / 1000)
}

fn is_date_like(value: &Bound<'_, PyAny>) -> bool {
    value.hasattr("year").unwrap_or(false)
}

fn is_datetime_like(value: &Bound<'_, PyAny>) -> bool {
    is_date_like(value) && value.hasattr("hour").unwrap_or(false)
}

fn is_time_like(value: &Bound<'_, PyAny>) -> bool {
    !is_date_like(value) && value.hasattr("hour").unwrap_or(false)
}

/// Infer the column type from the first non-None element
fn infer_type(values: &Bound<'_, PyList>) -> PyResult<ColumnType> {
    for value in values.iter() {
        if value.is_none() {
            continue;
        }
        // bool is an int subclass in Python, so it goes first
        if value.is_instance_of::<pyo3::types::PyBool>() {
            return Ok(ColumnType::Bool);
        }
        if value.is_instance_of::<pyo3::types::PyInt>() {
            return Ok(ColumnType::Int64);
        }
        if value.is_instance_of::<pyo3::types::PyFloat>() {
            return Ok(ColumnType::Float64);
        }
        if value.is_instance_of::<pyo3::types::PyString>() {
            return Ok(ColumnType::String);
        }
        if is_datetime_like(&value) {
            return Ok(ColumnType::Datetime);
        }
        if is_date_like(&value) {
            return Ok(ColumnType::Date);
        }
        if is_time_like(&value) {
            return Ok(ColumnType::Time);
        }
        return Err(PyTypeError::new_err(format!(
            "unsupported cell type: {}",
            value.get_type().name()?
        )));
    }
    // All-null columns display as strings
    Ok(ColumnType::String)
}

fn convert_value(value: &Bound<'_, PyAny>, column_type: ColumnType) -> PyResult<ColumnValue> {
    if value.is_none() {
        return Ok(ColumnValue::Null);
    }
    let converted = match column_type {
        ColumnType::Bool => ColumnValue::Bool(value.extract()?),
        ColumnType::Int64 => ColumnValue::Int64(value.extract()?),
        ColumnType::Float64 => ColumnValue::Float64(value.extract()?),
        ColumnType::String => ColumnValue::String(value.extract()?),
        ColumnType::Date => ColumnValue::Date(date_to_days_since_epoch(value)?),
        ColumnType::Datetime => {
            let (ms, timezone) = datetime_to_ms_since_epoch(value)?;
            ColumnValue::Datetime(ms, timezone)
        }
        ColumnType::Time => ColumnValue::Time(time_to_ms(value)?),
    };
    Ok(converted)
}

fn column_from_pylist(name: &str, values: &Bound<'_, PyList>) -> PyResult<Column> {
    let column_type = infer_type(values)?;
    let mut column = Column::new(name.to_string(), column_type);
    for value in values.iter() {
        let converted = convert_value(&value, column_type)?;
        column.push(converted).map_err(PyValueError::new_err)?;
    }
    Ok(column)
}

fn frame_from_pydict(name: &str, data: &Bound<'_, PyDict>) -> PyResult<Backing> {
    let mut columns = Vec::with_capacity(data.len());
    for (key, value) in data.iter() {
        let column_name: String = key.extract()?;
        let values = value.downcast::<PyList>().map_err(|_| {
            PyTypeError::new_err(format!("column '{}' must be a list", column_name))
        })?;
        columns.push(column_from_pylist(&column_name, values)?);
    }
    let table = Table::new(name.to_string(), columns).map_err(PyValueError::new_err)?;
    Ok(Backing::Frame(table))
}

fn path_to_keys(path: Vec<String>) -> Vec<AccessKey> {
    path.into_iter().map(AccessKey::Str).collect()
}

// ============================================================================
// Service Wrapper
// ============================================================================

/// Python-exposed explorer service
#[pyclass(name = "DataExplorerService")]
pub struct PyDataExplorerService {
    inner: Arc<Mutex<DataExplorerService>>,
}

#[pymethods]
impl PyDataExplorerService {
    #[new]
    #[pyo3(signature = (num_workers = 2))]
    fn new(num_workers: usize) -> Self {
        PyDataExplorerService {
            inner: Arc::new(Mutex::new(DataExplorerService::new(num_workers))),
        }
    }

    /// Open a view over a dict of column name -> list of cells. Returns
    /// the comm id.
    #[pyo3(signature = (display_name, data, path = None))]
    fn open_frame(
        &self,
        display_name: &str,
        data: &Bound<'_, PyDict>,
        path: Option<Vec<String>>,
    ) -> PyResult<String> {
        let backing = frame_from_pydict(display_name, data)?;
        let keys = path.map(path_to_keys);
        let mut service = self.lock()?;
        Ok(service.register_table(display_name.to_string(), Arc::new(backing), keys.as_deref()))
    }

    /// Open a view over a flat list of cells, treated as a one-column
    /// series.
    #[pyo3(signature = (display_name, values, path = None))]
    fn open_series(
        &self,
        display_name: &str,
        values: &Bound<'_, PyList>,
        path: Option<Vec<String>>,
    ) -> PyResult<String> {
        let column = column_from_pylist(display_name, values)?;
        let backing = Backing::Series {
            column,
            row_labels: None,
        };
        let keys = path.map(path_to_keys);
        let mut service = self.lock()?;
        Ok(service.register_table(display_name.to_string(), Arc::new(backing), keys.as_deref()))
    }

    fn close_table(&self, comm_id: &str) -> PyResult<bool> {
        Ok(self.lock()?.close_table(comm_id))
    }

    /// Dispatch one JSON-encoded RPC request; returns the JSON reply.
    fn handle_request(&self, request_json: &str) -> PyResult<String> {
        let response: RpcResponse = self.lock()?.handle_raw_request(request_json);
        serde_json::to_string(&response).map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Report that the variable at `path` was reassigned to `new_data`
    /// (a dict of columns), or possibly mutated in place when None.
    #[pyo3(signature = (path, new_data = None))]
    fn update_variable(
        &self,
        path: Vec<String>,
        new_data: Option<&Bound<'_, PyDict>>,
    ) -> PyResult<()> {
        let update = match new_data {
            Some(data) => {
                let backing = frame_from_pydict("updated", data)?;
                VariableUpdate::Reassigned(Arc::new(backing))
            }
            None => VariableUpdate::MaybeMutated,
        };
        self.lock()?
            .handle_variable_update(&path_to_keys(path), update);
        Ok(())
    }

    /// Drain queued events as (comm_id, event_json) pairs.
    fn take_events(&self) -> PyResult<Vec<(String, String)>> {
        let events = self.lock()?.take_events();
        let mut out = Vec::with_capacity(events.len());
        for (comm_id, event) in events {
            let json =
                serde_json::to_string(&event).map_err(|e| PyValueError::new_err(e.to_string()))?;
            out.push((comm_id, json));
        }
        Ok(out)
    }

    /// Block until all queued profile jobs have finished.
    fn wait_for_idle(&self) -> PyResult<()> {
        self.lock()?.wait_for_idle();
        Ok(())
    }

    fn num_views(&self) -> PyResult<usize> {
        Ok(self.lock()?.num_views())
    }
}

impl PyDataExplorerService {
    fn lock(&self) -> PyResult<std::sync::MutexGuard<'_, DataExplorerService>> {
        self.inner
            .lock()
            .map_err(|_| PyValueError::new_err("explorer service lock poisoned"))
    }
}

/// Python module definition
#[pymodule]
fn tablescope(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyDataExplorerService>()?;
    Ok(())
}
