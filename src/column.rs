/// TableScope Column Implementation
///
/// A Column is a typed, array-like container of values belonging to one
/// backing table. Columns are read-only once a table is registered with the
/// engine; the append path exists only for construction (fixtures, JSON
/// ingestion, language bindings).
///
/// Datetime values carry UTC milliseconds plus an optional zone name per
/// value, so a single column may mix zones; the profiler detects that case
/// rather than averaging across zones.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Column data types understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int64,
    Float64,
    String,
    Bool,
    Date,
    Datetime,
    Time,
}

impl ColumnType {
    /// Backend-native type name reported in schemas.
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::String => "string",
            ColumnType::Bool => "bool",
            ColumnType::Date => "date",
            ColumnType::Datetime => "datetime",
            ColumnType::Time => "time",
        }
    }

    /// The display category used for filter applicability and profiling.
    pub fn display_type(&self) -> DisplayType {
        match self {
            ColumnType::Int64 | ColumnType::Float64 => DisplayType::Number,
            ColumnType::String => DisplayType::String,
            ColumnType::Bool => DisplayType::Boolean,
            ColumnType::Date => DisplayType::Date,
            ColumnType::Datetime => DisplayType::Datetime,
            ColumnType::Time => DisplayType::Time,
        }
    }

    /// Parse a backend-native type name, for ingestion paths.
    pub fn from_type_name(name: &str) -> Result<Self, String> {
        match name {
            "int64" | "int" => Ok(ColumnType::Int64),
            "float64" | "float" => Ok(ColumnType::Float64),
            "string" | "str" => Ok(ColumnType::String),
            "bool" => Ok(ColumnType::Bool),
            "date" => Ok(ColumnType::Date),
            "datetime" => Ok(ColumnType::Datetime),
            "time" => Ok(ColumnType::Time),
            other => Err(format!("Unsupported column type '{}'", other)),
        }
    }
}

/// Wire-level display category for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayType {
    Number,
    Boolean,
    String,
    Date,
    Datetime,
    Time,
    Array,
    Struct,
    Interval,
    Unknown,
}

/// A single cell value.
///
/// `Datetime` stores UTC milliseconds since the epoch and the zone name the
/// value was observed in (None means zone-naive).
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Int64(i64),
    Float64(f64),
    String(String),
    Bool(bool),
    /// Days since 1970-01-01.
    Date(i32),
    /// Milliseconds since the epoch (UTC) plus optional zone name.
    Datetime(i64, Option<String>),
    /// Milliseconds since midnight.
    Time(i64),
    Null,
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ColumnValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::Int64(v) => Some(*v as f64),
            ColumnValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            ColumnValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ColumnValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric magnitude used for histograms and stats: integers and floats
    /// as themselves, dates and datetimes as epoch-based milliseconds,
    /// times as ms since midnight. None for null and non-numeric values.
    pub fn numeric_value(&self) -> Option<f64> {
        match self {
            ColumnValue::Int64(v) => Some(*v as f64),
            ColumnValue::Float64(v) => Some(*v),
            ColumnValue::Date(days) => Some(*days as f64 * 86_400_000.0),
            ColumnValue::Datetime(ms, _) => Some(*ms as f64),
            ColumnValue::Time(ms) => Some(*ms as f64),
            _ => None,
        }
    }
}

/// A typed value container with construction-time validation.
pub struct Column {
    name: String,
    column_type: ColumnType,
    values: Vec<ColumnValue>,
}

impl Column {
    pub fn new(name: String, column_type: ColumnType) -> Self {
        Column {
            name,
            column_type,
            values: Vec::new(),
        }
    }

    /// Build a column from pre-validated values.
    pub fn from_values(
        name: String,
        column_type: ColumnType,
        values: Vec<ColumnValue>,
    ) -> Result<Self, String> {
        let mut col = Column::new(name, column_type);
        for v in values {
            col.push(v)?;
        }
        Ok(col)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn display_type(&self) -> DisplayType {
        self.column_type.display_type()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append a value, validating it against the column type. Nulls are
    /// accepted for every type.
    pub fn push(&mut self, value: ColumnValue) -> Result<(), String> {
        let ok = match (&value, self.column_type) {
            (ColumnValue::Null, _) => true,
            (ColumnValue::Int64(_), ColumnType::Int64) => true,
            (ColumnValue::Float64(_), ColumnType::Float64) => true,
            (ColumnValue::String(_), ColumnType::String) => true,
            (ColumnValue::Bool(_), ColumnType::Bool) => true,
            (ColumnValue::Date(_), ColumnType::Date) => true,
            (ColumnValue::Datetime(_, _), ColumnType::Datetime) => true,
            (ColumnValue::Time(_), ColumnType::Time) => true,
            _ => false,
        };
        if !ok {
            return Err(format!(
                "Type mismatch in column '{}': expected {:?}, got {:?}",
                self.name, self.column_type, value
            ));
        }
        self.values.push(value);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<ColumnValue, String> {
        self.values
            .get(index)
            .cloned()
            .ok_or_else(|| format!("Index {} out of range [0, {})", index, self.values.len()))
    }

    /// Reference access without cloning.
    #[inline]
    pub fn get_ref(&self, index: usize) -> Option<&ColumnValue> {
        self.values.get(index)
    }

    #[inline]
    pub fn is_null_at(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(ColumnValue::Null) | None)
    }

    /// Fast numeric access for aggregation loops. Returns None for null,
    /// non-numeric types, or out-of-range indices.
    #[inline]
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        self.values.get(index).and_then(|v| v.numeric_value())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnValue> {
        self.values.iter()
    }
}

impl Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Column {{ name: '{}', type: {:?}, len: {} }}",
            self.name,
            self.column_type,
            self.len()
        )
    }
}

// ============================================================================
// Date/time helpers
// ============================================================================

/// Convert days since Unix epoch (1970-01-01) to (year, month, day)
pub fn ymd_from_days(days: i32) -> (i32, u32, u32) {
    // Algorithm from https://howardhinnant.github.io/date_algorithms.html
    let z = days + 719468;
    let era = if z >= 0 { z / 146097 } else { (z - 146096) / 146097 };
    let doe = (z - era * 146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = (yoe as i32) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if m <= 2 { y + 1 } else { y };
    (year, m, d)
}

/// Convert (year, month, day) to days since Unix epoch
pub fn days_from_ymd(year: i32, month: u32, day: u32) -> i32 {
    // Algorithm from https://howardhinnant.github.io/date_algorithms.html
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y / 400 } else { (y - 399) / 400 };
    let yoe = (y - era * 400) as u32;
    let m = month;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    (era * 146097 + doe as i32) - 719468
}

/// Format a date (days since epoch) as ISO 8601 date string (YYYY-MM-DD)
pub fn format_date(days: i32) -> String {
    let (year, month, day) = ymd_from_days(days);
    format!("{:04}-{:02}-{:02}", year, month, day)
}

/// Format a datetime (milliseconds since epoch) as ISO 8601 datetime string
pub fn format_datetime(ms: i64) -> String {
    // Negative milliseconds (dates before the epoch) need a floor adjustment
    let (days, time_ms) = if ms >= 0 {
        ((ms / 86_400_000) as i32, (ms % 86_400_000) as u32)
    } else {
        let d = (ms / 86_400_000) as i32 - if ms % 86_400_000 != 0 { 1 } else { 0 };
        let t = ((ms % 86_400_000) + 86_400_000) as u32 % 86_400_000;
        (d, t)
    };

    let (year, month, day) = ymd_from_days(days);
    let hour = time_ms / 3_600_000;
    let minute = (time_ms % 3_600_000) / 60_000;
    let second = (time_ms % 60_000) / 1000;
    let millisecond = time_ms % 1000;

    if millisecond > 0 {
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}",
            year, month, day, hour, minute, second, millisecond
        )
    } else {
        format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            year, month, day, hour, minute, second
        )
    }
}

/// Format a time of day (milliseconds since midnight) as HH:MM:SS[.mmm]
pub fn format_time(ms: i64) -> String {
    let ms = ms.rem_euclid(86_400_000);
    let hour = ms / 3_600_000;
    let minute = (ms % 3_600_000) / 60_000;
    let second = (ms % 60_000) / 1000;
    let millisecond = ms % 1000;
    if millisecond > 0 {
        format!("{:02}:{:02}:{:02}.{:03}", hour, minute, second, millisecond)
    } else {
        format!("{:02}:{:02}:{:02}", hour, minute, second)
    }
}

/// Parse an ISO 8601 date string (YYYY-MM-DD) to days since epoch
pub fn parse_date(s: &str) -> Option<i32> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3 {
        return None;
    }
    let year: i32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let day: u32 = parts[2].parse().ok()?;

    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    Some(days_from_ymd(year, month, day))
}

/// Parse an ISO 8601 datetime string to milliseconds since epoch.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS[.mmm]`, space-separated
/// variants, a trailing `Z`, and an explicit `+HH:MM` / `-HH:MM` offset
/// (the offset is applied so the result is a UTC instant).
pub fn parse_datetime(s: &str) -> Option<i64> {
    let (date_part, time_part) = if s.contains('T') {
        let parts: Vec<&str> = s.splitn(2, 'T').collect();
        (parts[0], parts[1])
    } else if s.contains(' ') {
        let parts: Vec<&str> = s.splitn(2, ' ').collect();
        (parts[0], parts[1])
    } else {
        // Just a date, treat as midnight
        return parse_date(s).map(|d| (d as i64) * 86_400_000);
    };

    let days = parse_date(date_part)?;

    // Split a UTC offset off the end of the time part, if present
    let time_part = time_part.trim_end_matches('Z');
    if time_part.is_empty() {
        return None;
    }
    let (time_part, offset_ms) = match time_part[1..].find(['+', '-']) {
        Some(pos) => {
            let (t, off) = time_part.split_at(pos + 1);
            (t, parse_utc_offset(off)?)
        }
        None => (time_part, 0),
    };

    let (time_str, ms) = if time_part.contains('.') {
        let parts: Vec<&str> = time_part.splitn(2, '.').collect();
        let ms_str = parts.get(1)?;
        // Variable-length fractional seconds (.1, .12, .123, .123456)
        let ms: u32 = if ms_str.len() >= 3 {
            ms_str[..3].parse().ok()?
        } else {
            let padded = format!("{:0<3}", ms_str);
            padded.parse().ok()?
        };
        (parts[0], ms)
    } else {
        (time_part, 0)
    };

    let time_ms = parse_time(time_str)? + ms as i64;

    Some((days as i64) * 86_400_000 + time_ms - offset_ms)
}

/// Parse HH:MM[:SS] into milliseconds since midnight
pub fn parse_time(s: &str) -> Option<i64> {
    let time_parts: Vec<&str> = s.split(':').collect();
    if time_parts.len() < 2 {
        return None;
    }

    let hour: u32 = time_parts[0].parse().ok()?;
    let minute: u32 = time_parts[1].parse().ok()?;
    let second: u32 = time_parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);

    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }

    Some((hour as i64) * 3_600_000 + (minute as i64) * 60_000 + (second as i64) * 1000)
}

/// Parse a `+HH:MM` / `-HH:MM` / `+HHMM` UTC offset into milliseconds
fn parse_utc_offset(s: &str) -> Option<i64> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1i64, &s[1..]),
        b'-' => (-1i64, &s[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 {
        return None;
    }
    let hours: i64 = digits[..2].parse().ok()?;
    let minutes: i64 = digits[2..].parse().ok()?;
    Some(sign * (hours * 3_600_000 + minutes * 60_000))
}
