/// Access-key codec
///
/// Variable paths address values inside the host namespace, and each step of
/// a path is a mapping key that may not be a string (integers, floats,
/// booleans, bytes, timestamps, small ranges). Keys are encoded to a
/// canonical JSON string of the shape `{"type": <tag>, "data": <payload>}`
/// so they can live inside path strings and filter payloads, and decoded
/// back exactly.
///
/// The one special case: an empty string key encodes to itself unchanged.

use serde_json::{json, Value as JsonValue};
use std::fmt;

/// A hashable mapping key supported by the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessKey {
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex { re: f64, im: f64 },
    Str(String),
    Bytes(Vec<u8>),
    /// Milliseconds since the epoch, UTC.
    Timestamp(i64),
    Range { start: i64, stop: i64, step: i64 },
}

/// Error raised for keys (or encoded tags) the codec does not support.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyCodecError {
    UnsupportedKeyType(String),
    Malformed(String),
}

impl fmt::Display for KeyCodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyCodecError::UnsupportedKeyType(what) => {
                write!(f, "Unsupported access-key type: {}", what)
            }
            KeyCodecError::Malformed(what) => {
                write!(f, "Malformed access-key encoding: {}", what)
            }
        }
    }
}

impl std::error::Error for KeyCodecError {}

/// Non-finite floats cannot be JSON numbers, so they get string payloads.
fn float_to_json(v: f64) -> JsonValue {
    if v.is_nan() {
        json!("nan")
    } else if v == f64::INFINITY {
        json!("inf")
    } else if v == f64::NEG_INFINITY {
        json!("-inf")
    } else {
        json!(v)
    }
}

fn float_from_json(v: &JsonValue) -> Result<f64, KeyCodecError> {
    match v {
        JsonValue::Number(n) => n
            .as_f64()
            .ok_or_else(|| KeyCodecError::Malformed(format!("bad float payload {}", n))),
        JsonValue::String(s) => match s.as_str() {
            "nan" => Ok(f64::NAN),
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            other => Err(KeyCodecError::Malformed(format!(
                "bad float payload '{}'",
                other
            ))),
        },
        other => Err(KeyCodecError::Malformed(format!(
            "bad float payload {}",
            other
        ))),
    }
}

/// Serialize a key to its canonical string form.
pub fn encode(key: &AccessKey) -> String {
    let (tag, data) = match key {
        AccessKey::Bool(b) => ("bool", json!(b)),
        AccessKey::Int(i) => ("int", json!(i)),
        AccessKey::Float(v) => ("float", float_to_json(*v)),
        AccessKey::Complex { re, im } => {
            ("complex", json!({"re": float_to_json(*re), "im": float_to_json(*im)}))
        }
        AccessKey::Str(s) => {
            if s.is_empty() {
                return String::new();
            }
            ("str", json!(s))
        }
        AccessKey::Bytes(b) => ("bytes", json!(b)),
        AccessKey::Timestamp(ms) => ("timestamp", json!(ms)),
        AccessKey::Range { start, stop, step } => {
            ("range", json!({"start": start, "stop": stop, "step": step}))
        }
    };
    json!({"type": tag, "data": data}).to_string()
}

/// Exact inverse of [`encode`].
pub fn decode(encoded: &str) -> Result<AccessKey, KeyCodecError> {
    if encoded.is_empty() {
        return Ok(AccessKey::Str(String::new()));
    }

    let parsed: JsonValue = serde_json::from_str(encoded)
        .map_err(|e| KeyCodecError::Malformed(e.to_string()))?;
    let tag = parsed
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| KeyCodecError::Malformed("missing type tag".to_string()))?;
    let data = parsed
        .get("data")
        .ok_or_else(|| KeyCodecError::Malformed("missing data field".to_string()))?;

    match tag {
        "bool" => data
            .as_bool()
            .map(AccessKey::Bool)
            .ok_or_else(|| KeyCodecError::Malformed("bad bool payload".to_string())),
        "int" => data
            .as_i64()
            .map(AccessKey::Int)
            .ok_or_else(|| KeyCodecError::Malformed("bad int payload".to_string())),
        "float" => float_from_json(data).map(AccessKey::Float),
        "complex" => {
            let re = data
                .get("re")
                .ok_or_else(|| KeyCodecError::Malformed("complex missing re".to_string()))?;
            let im = data
                .get("im")
                .ok_or_else(|| KeyCodecError::Malformed("complex missing im".to_string()))?;
            Ok(AccessKey::Complex {
                re: float_from_json(re)?,
                im: float_from_json(im)?,
            })
        }
        "str" => data
            .as_str()
            .map(|s| AccessKey::Str(s.to_string()))
            .ok_or_else(|| KeyCodecError::Malformed("bad str payload".to_string())),
        "bytes" => {
            let arr = data
                .as_array()
                .ok_or_else(|| KeyCodecError::Malformed("bad bytes payload".to_string()))?;
            let mut bytes = Vec::with_capacity(arr.len());
            for b in arr {
                let b = b
                    .as_u64()
                    .filter(|b| *b <= u8::MAX as u64)
                    .ok_or_else(|| KeyCodecError::Malformed("bad byte value".to_string()))?;
                bytes.push(b as u8);
            }
            Ok(AccessKey::Bytes(bytes))
        }
        "timestamp" => data
            .as_i64()
            .map(AccessKey::Timestamp)
            .ok_or_else(|| KeyCodecError::Malformed("bad timestamp payload".to_string())),
        "range" => {
            let field = |name: &str| -> Result<i64, KeyCodecError> {
                data.get(name).and_then(|v| v.as_i64()).ok_or_else(|| {
                    KeyCodecError::Malformed(format!("range missing '{}'", name))
                })
            };
            Ok(AccessKey::Range {
                start: field("start")?,
                stop: field("stop")?,
                step: field("step")?,
            })
        }
        other => Err(KeyCodecError::UnsupportedKeyType(other.to_string())),
    }
}

/// Encode a full path of keys; used by the service's path index.
pub fn encode_path(path: &[AccessKey]) -> Vec<String> {
    path.iter().map(encode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_kinds() {
        let keys = vec![
            AccessKey::Bool(true),
            AccessKey::Bool(false),
            AccessKey::Int(-42),
            AccessKey::Float(2.5),
            AccessKey::Float(f64::INFINITY),
            AccessKey::Complex { re: 1.0, im: -2.0 },
            AccessKey::Str("hello".to_string()),
            AccessKey::Bytes(vec![0, 127, 255]),
            AccessKey::Timestamp(1_700_000_000_000),
            AccessKey::Range {
                start: 0,
                stop: 10,
                step: 2,
            },
        ];

        for key in keys {
            let encoded = encode(&key);
            let decoded = decode(&encoded).unwrap();
            assert_eq!(decoded, key, "round trip failed for {}", encoded);
        }
    }

    #[test]
    fn test_nan_round_trip() {
        // NaN never compares equal to itself, so test via is_nan
        let encoded = encode(&AccessKey::Float(f64::NAN));
        match decode(&encoded).unwrap() {
            AccessKey::Float(v) => assert!(v.is_nan()),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_string_passthrough() {
        let encoded = encode(&AccessKey::Str(String::new()));
        assert_eq!(encoded, "");
        assert_eq!(decode("").unwrap(), AccessKey::Str(String::new()));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = decode(r#"{"type": "tensor", "data": null}"#).unwrap_err();
        assert!(matches!(err, KeyCodecError::UnsupportedKeyType(t) if t == "tensor"));
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"data": 1}"#).is_err());
        assert!(decode(r#"{"type": "int", "data": "x"}"#).is_err());
    }

    #[test]
    fn test_encoding_is_canonical() {
        // Same key always produces the identical string
        let k = AccessKey::Range {
            start: 1,
            stop: 5,
            step: 1,
        };
        assert_eq!(encode(&k), encode(&k));
    }
}
