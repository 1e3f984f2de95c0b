/// Column profiler
///
/// Profiles run over the virtual row set of a view (filtered, order does
/// not matter) and report null counts, display-type-conditioned summary
/// stats, small histograms, and small frequency tables. Numeric outputs
/// are formatted per the request's `FormatOptions` so the client renders
/// them verbatim.

use crate::column::{format_datetime, Column, ColumnValue, DisplayType};
use crate::format::{format_number, format_value, FormatOptions};
use crate::table::Backing;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Distinct timezones listed verbatim before the "N more" suffix kicks in.
const MAX_LISTED_TIMEZONES: usize = 3;

// ===== Request types =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinMethod {
    Fixed,
    Sturges,
    Scott,
    FreedmanDiaconis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "profile_type", rename_all = "snake_case")]
pub enum ProfileKind {
    NullCount,
    SummaryStats,
    SmallHistogram { method: BinMethod, num_bins: usize },
    SmallFrequencyTable { limit: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfileRequest {
    pub column_index: usize,
    #[serde(flatten)]
    pub kind: ProfileKind,
}

// ===== Result types =====

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnProfileResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub null_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_stats: Option<SummaryStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_histogram: Option<Histogram>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_frequency_table: Option<FrequencyTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryStats {
    pub type_display: DisplayType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_stats: Option<NumberStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_stats: Option<StringStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boolean_stats: Option<BooleanStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_stats: Option<DateStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberStats {
    pub min_value: Option<String>,
    pub max_value: Option<String>,
    pub mean: Option<String>,
    pub median: Option<String>,
    pub stdev: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StringStats {
    pub num_empty: usize,
    pub num_unique: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BooleanStats {
    pub true_count: usize,
    pub false_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateStats {
    pub num_unique: usize,
    pub min_date: Option<String>,
    pub mean_date: Option<String>,
    pub median_date: Option<String>,
    pub max_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Histogram {
    pub bin_edges: Vec<String>,
    pub bin_counts: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyTable {
    pub values: Vec<String>,
    pub counts: Vec<usize>,
    pub other_count: usize,
}

// ===== Entry point =====

/// Run one profile request against a column, reading only the given
/// physical rows. Errors land in `error_message` rather than propagating,
/// so one bad request never sinks a batch.
pub fn profile_column(
    backing: &Backing,
    rows: &[usize],
    request: &ColumnProfileRequest,
    options: &FormatOptions,
) -> ColumnProfileResult {
    let column = match backing.column(request.column_index) {
        Ok(c) => c,
        Err(message) => {
            return ColumnProfileResult {
                error_message: Some(message),
                ..Default::default()
            }
        }
    };
    let mut result = ColumnProfileResult::default();
    match &request.kind {
        ProfileKind::NullCount => {
            result.null_count = Some(null_count(column, rows));
        }
        ProfileKind::SummaryStats => {
            result.summary_stats = Some(summary_stats(column, rows, options));
        }
        ProfileKind::SmallHistogram { method, num_bins } => {
            match histogram(column, rows, *method, *num_bins, options) {
                Ok(h) => result.small_histogram = Some(h),
                Err(message) => result.error_message = Some(message),
            }
        }
        ProfileKind::SmallFrequencyTable { limit } => {
            result.small_frequency_table = Some(frequency_table(column, rows, *limit, options));
        }
    }
    result
}

pub fn null_count(column: &Column, rows: &[usize]) -> usize {
    rows.iter().filter(|&&r| column.is_null_at(r)).count()
}

// ===== Summary stats =====

pub fn summary_stats(column: &Column, rows: &[usize], options: &FormatOptions) -> SummaryStats {
    let type_display = column.display_type();
    let mut stats = SummaryStats {
        type_display,
        number_stats: None,
        string_stats: None,
        boolean_stats: None,
        date_stats: None,
    };
    match type_display {
        DisplayType::Number => stats.number_stats = Some(number_stats(column, rows, options)),
        DisplayType::String => stats.string_stats = Some(string_stats(column, rows)),
        DisplayType::Boolean => stats.boolean_stats = Some(boolean_stats(column, rows)),
        DisplayType::Date | DisplayType::Datetime => {
            stats.date_stats = Some(date_stats(column, rows))
        }
        _ => {}
    }
    stats
}

fn number_stats(column: &Column, rows: &[usize], options: &FormatOptions) -> NumberStats {
    let mut values: Vec<f64> = rows
        .iter()
        .filter_map(|&r| column.get_f64(r))
        .filter(|v| !v.is_nan())
        .collect();
    if values.is_empty() {
        return NumberStats {
            min_value: None,
            max_value: None,
            mean: None,
            median: None,
            stdev: None,
        };
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    let min = values[0];
    let max = values[n - 1];
    let mean = values.iter().sum::<f64>() / n as f64;
    let median = median_of_sorted(&values);
    let stdev = if n > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Some(var.sqrt())
    } else {
        None
    };
    NumberStats {
        min_value: Some(format_number(min, options)),
        max_value: Some(format_number(max, options)),
        mean: Some(format_number(mean, options)),
        median: Some(format_number(median, options)),
        stdev: stdev.map(|s| format_number(s, options)),
    }
}

fn string_stats(column: &Column, rows: &[usize]) -> StringStats {
    let mut num_empty = 0;
    let mut seen: HashMap<&str, ()> = HashMap::new();
    for &r in rows {
        if let Some(ColumnValue::String(s)) = column.get_ref(r) {
            if s.is_empty() {
                num_empty += 1;
            }
            seen.insert(s.as_str(), ());
        }
    }
    StringStats {
        num_empty,
        num_unique: seen.len(),
    }
}

fn boolean_stats(column: &Column, rows: &[usize]) -> BooleanStats {
    let mut true_count = 0;
    let mut false_count = 0;
    for &r in rows {
        match column.get_ref(r) {
            Some(ColumnValue::Bool(true)) => true_count += 1,
            Some(ColumnValue::Bool(false)) => false_count += 1,
            _ => {}
        }
    }
    BooleanStats {
        true_count,
        false_count,
    }
}

fn date_stats(column: &Column, rows: &[usize]) -> DateStats {
    let mut values: Vec<f64> = Vec::new();
    let mut zones: Vec<String> = Vec::new();
    for &r in rows {
        match column.get_ref(r) {
            Some(v @ ColumnValue::Date(_)) | Some(v @ ColumnValue::Datetime(_, _)) => {
                if let Some(ms) = v.numeric_value() {
                    values.push(ms);
                }
                if let ColumnValue::Datetime(_, Some(tz)) = v {
                    if !zones.contains(tz) {
                        zones.push(tz.clone());
                    }
                }
            }
            _ => {}
        }
    }
    if values.is_empty() {
        return DateStats {
            num_unique: 0,
            min_date: None,
            mean_date: None,
            median_date: None,
            max_date: None,
            timezone: join_zones(&zones),
        };
    }
    let mut sorted = values.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let num_unique = {
        let mut uniq = sorted.clone();
        uniq.dedup();
        uniq.len()
    };
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    let mixed_zones = zones.len() > 1;
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let median = median_of_sorted(&sorted);
    DateStats {
        num_unique,
        min_date: Some(format_datetime(min as i64)),
        // Averaging across distinct zones is not meaningful
        mean_date: if mixed_zones {
            None
        } else {
            Some(format_datetime(mean as i64))
        },
        median_date: if mixed_zones {
            None
        } else {
            Some(format_datetime(median as i64))
        },
        max_date: Some(format_datetime(max as i64)),
        timezone: join_zones(&zones),
    }
}

fn join_zones(zones: &[String]) -> Option<String> {
    match zones.len() {
        0 => None,
        n if n <= MAX_LISTED_TIMEZONES => Some(zones.join(", ")),
        n => Some(format!(
            "{}, {} more",
            zones[..MAX_LISTED_TIMEZONES].join(", "),
            n - MAX_LISTED_TIMEZONES
        )),
    }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

// ===== Histograms =====

/// Bin the column's non-null numeric values. `num_bins` is the exact bin
/// count for `fixed` and an upper bound for the auto methods.
pub fn histogram(
    column: &Column,
    rows: &[usize],
    method: BinMethod,
    num_bins: usize,
    options: &FormatOptions,
) -> Result<Histogram, String> {
    if num_bins == 0 {
        return Err("histogram requires a positive bin count".to_string());
    }
    let mut values: Vec<f64> = rows
        .iter()
        .filter_map(|&r| column.get_f64(r))
        .filter(|v| v.is_finite())
        .collect();
    if values.is_empty() {
        return Ok(Histogram {
            bin_edges: vec![],
            bin_counts: vec![],
        });
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    let lo = values[0];
    let hi = values[n - 1];

    // Single element or single distinct value collapses to one bin
    if lo == hi {
        let edge = format_number(lo, options);
        return Ok(Histogram {
            bin_edges: vec![edge.clone(), edge],
            bin_counts: vec![n],
        });
    }

    let bins = match method {
        BinMethod::Fixed => num_bins,
        BinMethod::Sturges => sturges_bins(n),
        BinMethod::Scott => {
            let mean = values.iter().sum::<f64>() / n as f64;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
            bins_from_width(lo, hi, 3.49 * var.sqrt() * (n as f64).powf(-1.0 / 3.0), n)
        }
        BinMethod::FreedmanDiaconis => {
            let q1 = quantile_of_sorted(&values, 0.25);
            let q3 = quantile_of_sorted(&values, 0.75);
            bins_from_width(lo, hi, 2.0 * (q3 - q1) * (n as f64).powf(-1.0 / 3.0), n)
        }
    };
    let bins = bins.clamp(1, num_bins.max(1));

    let span = hi - lo;
    let mut counts = vec![0usize; bins];
    for &v in &values {
        let mut idx = ((v - lo) / span * bins as f64) as usize;
        if idx >= bins {
            idx = bins - 1;
        }
        counts[idx] += 1;
    }
    let mut edges = Vec::with_capacity(bins + 1);
    for i in 0..=bins {
        let edge = lo + span * i as f64 / bins as f64;
        edges.push(format_number(edge, options));
    }
    Ok(Histogram {
        bin_edges: edges,
        bin_counts: counts,
    })
}

fn sturges_bins(n: usize) -> usize {
    (n as f64).log2().ceil() as usize + 1
}

fn bins_from_width(lo: f64, hi: f64, width: f64, n: usize) -> usize {
    if width <= 0.0 || !width.is_finite() {
        // Degenerate spread falls back to the Sturges count
        return sturges_bins(n);
    }
    ((hi - lo) / width).ceil() as usize
}

fn quantile_of_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q * (n - 1) as f64;
    let idx = pos.floor() as usize;
    let frac = pos - idx as f64;
    if idx + 1 < n {
        sorted[idx] * (1.0 - frac) + sorted[idx + 1] * frac
    } else {
        sorted[idx]
    }
}

// ===== Frequency table =====

/// The `limit` most frequent distinct values with counts, ties broken by
/// first-encountered order, remainder aggregated into `other_count`.
pub fn frequency_table(
    column: &Column,
    rows: &[usize],
    limit: usize,
    options: &FormatOptions,
) -> FrequencyTable {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for &r in rows {
        match column.get_ref(r) {
            None | Some(ColumnValue::Null) => continue,
            Some(cell) => {
                let key = format_value(cell, options);
                if !counts.contains_key(&key) {
                    order.push(key.clone());
                }
                *counts.entry(key).or_insert(0) += 1;
            }
        }
    }
    let mut ranked = order;
    // Stable sort by descending count keeps first-seen order on ties
    ranked.sort_by(|a, b| counts[b].cmp(&counts[a]));
    let mut values = Vec::new();
    let mut top_counts = Vec::new();
    let mut other_count = 0;
    for (i, key) in ranked.into_iter().enumerate() {
        let count = counts[&key];
        if i < limit {
            values.push(key);
            top_counts.push(count);
        } else {
            other_count += count;
        }
    }
    FrequencyTable {
        values,
        counts: top_counts,
        other_count,
    }
}
