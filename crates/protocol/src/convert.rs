//! Conversion between [`Bundle`] and structured JSON.
//!
//! Bundle → JSON is fallible: native handles and non-finite doubles have no
//! JSON form. JSON → bundle only requires the top level to be an object.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::bundle::{Bundle, BundleValue};

/// A message that could not be represented in the other shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// Field holds a [`NativeHandle`](crate::NativeHandle).
    #[error("field '{path}' holds a native handle and has no structured form")]
    NativeHandle { path: String },

    /// Field holds NaN or an infinity.
    #[error("field '{path}' holds a non-finite number")]
    NonFiniteNumber { path: String },

    /// Top-level JSON value was not an object.
    #[error("expected a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}

/// Converts a bundle into a JSON object.
pub fn bundle_to_json(bundle: &Bundle) -> Result<Value, ConversionError> {
    bundle_to_map(bundle, "").map(Value::Object)
}

/// Converts a JSON object into a bundle.
///
/// Integers that fit in `i64` become [`BundleValue::Int`]; every other number
/// becomes [`BundleValue::Double`].
pub fn json_to_bundle(value: &Value) -> Result<Bundle, ConversionError> {
    match value {
        Value::Object(map) => Ok(map_to_bundle(map)),
        other => Err(ConversionError::NotAnObject {
            found: json_kind(other),
        }),
    }
}

fn bundle_to_map(bundle: &Bundle, prefix: &str) -> Result<Map<String, Value>, ConversionError> {
    let mut map = Map::with_capacity(bundle.len());
    for (key, value) in bundle.iter() {
        let path = join_path(prefix, key);
        map.insert(key.to_string(), value_to_json(value, &path)?);
    }
    Ok(map)
}

fn value_to_json(value: &BundleValue, path: &str) -> Result<Value, ConversionError> {
    Ok(match value {
        BundleValue::Null => Value::Null,
        BundleValue::Bool(b) => Value::Bool(*b),
        BundleValue::Int(i) => Value::Number((*i).into()),
        BundleValue::Double(d) => Number::from_f64(*d)
            .map(Value::Number)
            .ok_or_else(|| ConversionError::NonFiniteNumber {
                path: path.to_string(),
            })?,
        BundleValue::String(s) => Value::String(s.clone()),
        BundleValue::Bytes(bytes) => Value::String(STANDARD.encode(bytes)),
        BundleValue::Bundle(inner) => Value::Object(bundle_to_map(inner, path)?),
        BundleValue::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| value_to_json(item, &format!("{path}[{i}]")))
                .collect::<Result<_, _>>()?,
        ),
        BundleValue::Handle(_) => {
            return Err(ConversionError::NativeHandle {
                path: path.to_string(),
            });
        }
    })
}

fn map_to_bundle(map: &Map<String, Value>) -> Bundle {
    map.iter()
        .map(|(key, value)| (key.clone(), json_to_value(value)))
        .collect()
}

fn json_to_value(value: &Value) -> BundleValue {
    match value {
        Value::Null => BundleValue::Null,
        Value::Bool(b) => BundleValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BundleValue::Int(i),
            None => BundleValue::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => BundleValue::String(s.clone()),
        Value::Array(items) => BundleValue::Array(items.iter().map(json_to_value).collect()),
        Value::Object(map) => BundleValue::Bundle(map_to_bundle(map)),
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
