/// Display formatting for data values
///
/// Everything a client sees in a grid cell, histogram edge, or stat bundle
/// passes through [`format_value`] with a caller-supplied [`FormatOptions`].
///
/// Rules:
/// - `large_num_digits` fractional digits for |x| >= 1, `small_num_digits`
///   for |x| < 1;
/// - scientific notation once the integral part needs more than
///   `max_integral_digits` digits, or when 0 < |x| < 10^-small_num_digits;
/// - `thousands_sep`, when set, is inserted into the integral part;
/// - infinities render as `INF` / `-INF`, null and NaN as the null token;
/// - strings longer than `max_value_length` are truncated silently.

use crate::column::{format_date, format_datetime, format_time, ColumnValue};
use serde::{Deserialize, Serialize};

/// Token rendered for null and NaN cells.
pub const NULL_TOKEN: &str = "<NA>";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOptions {
    pub large_num_digits: usize,
    pub small_num_digits: usize,
    pub max_integral_digits: usize,
    pub max_value_length: usize,
    pub thousands_sep: Option<String>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            large_num_digits: 2,
            small_num_digits: 4,
            max_integral_digits: 7,
            max_value_length: 1000,
            thousands_sep: None,
        }
    }
}

/// Format one value for display.
pub fn format_value(value: &ColumnValue, options: &FormatOptions) -> String {
    match value {
        ColumnValue::Null => NULL_TOKEN.to_string(),
        ColumnValue::Bool(b) => {
            if *b {
                "True".to_string()
            } else {
                "False".to_string()
            }
        }
        ColumnValue::Int64(v) => format_integer(*v, options),
        ColumnValue::Float64(v) => format_float(*v, options),
        ColumnValue::String(s) => truncate(s, options.max_value_length),
        ColumnValue::Date(days) => format_date(*days),
        ColumnValue::Datetime(ms, tz) => match tz {
            Some(tz) => format!("{} {}", format_datetime(*ms), tz),
            None => format_datetime(*ms),
        },
        ColumnValue::Time(ms) => format_time(*ms),
    }
}

/// Format an f64 that is already known to be a plain number (histogram bin
/// edges, stat values).
pub fn format_number(v: f64, options: &FormatOptions) -> String {
    format_float(v, options)
}

fn format_integer(v: i64, options: &FormatOptions) -> String {
    let digits = if v == 0 {
        1
    } else {
        v.unsigned_abs().to_string().len()
    };
    if digits > options.max_integral_digits {
        return format_scientific(v as f64, options);
    }
    let raw = v.unsigned_abs().to_string();
    let grouped = group_thousands(&raw, options.thousands_sep.as_deref());
    if v < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn format_float(v: f64, options: &FormatOptions) -> String {
    if v.is_nan() {
        return NULL_TOKEN.to_string();
    }
    if v == f64::INFINITY {
        return "INF".to_string();
    }
    if v == f64::NEG_INFINITY {
        return "-INF".to_string();
    }

    let abs = v.abs();
    let small_threshold = 10f64.powi(-(options.small_num_digits as i32));
    let integral_limit = 10f64.powi(options.max_integral_digits as i32);

    if abs != 0.0 && (abs >= integral_limit || abs < small_threshold) {
        return format_scientific(v, options);
    }

    let digits = if abs >= 1.0 || abs == 0.0 {
        options.large_num_digits
    } else {
        options.small_num_digits
    };
    let fixed = format!("{:.*}", digits, v);

    match options.thousands_sep.as_deref() {
        None => fixed,
        Some(sep) => {
            let (sign, rest) = match fixed.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => ("", fixed.as_str()),
            };
            let (int_part, frac_part) = match rest.split_once('.') {
                Some((i, f)) => (i, Some(f)),
                None => (rest, None),
            };
            let grouped = group_thousands(int_part, Some(sep));
            match frac_part {
                Some(f) => format!("{}{}.{}", sign, grouped, f),
                None => format!("{}{}", sign, grouped),
            }
        }
    }
}

fn format_scientific(v: f64, options: &FormatOptions) -> String {
    format!("{:.*e}", options.large_num_digits, v)
}

fn group_thousands(digits: &str, sep: Option<&str>) -> String {
    let sep = match sep {
        Some(s) if !s.is_empty() => s,
        _ => return digits.to_string(),
    };
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            out.push_str(sep);
        }
        out.push(*c);
    }
    out
}

/// Truncate to at most `max_len` characters. No ellipsis; truncation is
/// signaled out of band where display contexts need it.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        s.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> FormatOptions {
        FormatOptions::default()
    }

    #[test]
    fn test_integer_formatting() {
        assert_eq!(format_value(&ColumnValue::Int64(42), &opts()), "42");
        assert_eq!(format_value(&ColumnValue::Int64(-7), &opts()), "-7");
        assert_eq!(format_value(&ColumnValue::Int64(0), &opts()), "0");
    }

    #[test]
    fn test_thousands_separator() {
        let options = FormatOptions {
            thousands_sep: Some(",".to_string()),
            ..opts()
        };
        assert_eq!(format_value(&ColumnValue::Int64(1234567), &options), "1,234,567");
        assert_eq!(format_value(&ColumnValue::Int64(-1000), &options), "-1,000");
        assert_eq!(
            format_value(&ColumnValue::Float64(12345.5), &options),
            "12,345.50"
        );
    }

    #[test]
    fn test_fixed_point_digits() {
        // >= 1 uses large_num_digits, < 1 uses small_num_digits
        assert_eq!(format_value(&ColumnValue::Float64(3.14159), &opts()), "3.14");
        assert_eq!(format_value(&ColumnValue::Float64(0.123456), &opts()), "0.1235");
        assert_eq!(format_value(&ColumnValue::Float64(0.0), &opts()), "0.00");
    }

    #[test]
    fn test_scientific_switchover() {
        // More than max_integral_digits integral digits -> scientific
        assert_eq!(
            format_value(&ColumnValue::Float64(12345678.0), &opts()),
            "1.23e7"
        );
        assert_eq!(
            format_value(&ColumnValue::Int64(123456789), &opts()),
            "1.23e8"
        );
        // Below the small-number threshold -> scientific
        assert_eq!(
            format_value(&ColumnValue::Float64(0.00001), &opts()),
            "1.00e-5"
        );
        // At exactly seven digits, stays fixed
        assert_eq!(
            format_value(&ColumnValue::Float64(1234567.0), &opts()),
            "1234567.00"
        );
    }

    #[test]
    fn test_special_values() {
        assert_eq!(format_value(&ColumnValue::Float64(f64::INFINITY), &opts()), "INF");
        assert_eq!(
            format_value(&ColumnValue::Float64(f64::NEG_INFINITY), &opts()),
            "-INF"
        );
        assert_eq!(format_value(&ColumnValue::Float64(f64::NAN), &opts()), NULL_TOKEN);
        assert_eq!(format_value(&ColumnValue::Null, &opts()), NULL_TOKEN);
    }

    #[test]
    fn test_string_truncation() {
        let options = FormatOptions {
            max_value_length: 5,
            ..opts()
        };
        assert_eq!(
            format_value(&ColumnValue::String("abcdefgh".to_string()), &options),
            "abcde"
        );
        assert_eq!(
            format_value(&ColumnValue::String("abc".to_string()), &options),
            "abc"
        );
    }

    #[test]
    fn test_temporal_formatting() {
        assert_eq!(format_value(&ColumnValue::Date(0), &opts()), "1970-01-01");
        assert_eq!(
            format_value(&ColumnValue::Datetime(0, Some("UTC".to_string())), &opts()),
            "1970-01-01T00:00:00 UTC"
        );
        assert_eq!(format_value(&ColumnValue::Time(3_600_000), &opts()), "01:00:00");
    }

    #[test]
    fn test_bool_formatting() {
        assert_eq!(format_value(&ColumnValue::Bool(true), &opts()), "True");
        assert_eq!(format_value(&ColumnValue::Bool(false), &opts()), "False");
    }
}
