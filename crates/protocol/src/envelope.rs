//! Reserved field names and the request/response convention.
//!
//! Request/response is simulated over one-way messages. A request carries a
//! correlation key under [`GUID_KEY`]; its reply is an ordinary message whose
//! type is the request type plus [`RETURN_SUFFIX`] or [`ERROR_SUFFIX`], with
//! the same key and the payload under [`RESPONSE_KEY`].
//!
//! ```text
//! → {"type": "Prefs:Get", "GUID": "abc", "names": ["x"]}
//! ← {"type": "Prefs:Get:Return", "GUID": "abc", "response": {"value": 42}}
//! ```

use serde_json::{Map, Value, json};

use crate::bundle::{Bundle, BundleValue};

/// Routing key carried by every message.
pub const TYPE_KEY: &str = "type";

/// Correlation key linking a request to its response.
pub const GUID_KEY: &str = "GUID";

/// Field holding the payload of a response.
pub const RESPONSE_KEY: &str = "response";

/// Type suffix of a successful response.
pub const RETURN_SUFFIX: &str = ":Return";

/// Type suffix of an error response.
pub const ERROR_SUFFIX: &str = ":Error";

/// Outcome carried by a response message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Return,
    Error,
}

impl ResponseKind {
    pub fn suffix(self) -> &'static str {
        match self {
            ResponseKind::Return => RETURN_SUFFIX,
            ResponseKind::Error => ERROR_SUFFIX,
        }
    }
}

/// Correlation key found on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    Present(String),
    Missing,
    /// Key present but not a non-empty string.
    Malformed,
}

/// Read access to routing fields, independent of representation.
pub trait Envelope {
    /// The message's `type`, if present and non-empty.
    fn event_type(&self) -> Option<&str>;

    /// The message's correlation key.
    fn correlation(&self) -> Correlation;
}

impl Envelope for Bundle {
    fn event_type(&self) -> Option<&str> {
        Bundle::event_type(self)
    }

    fn correlation(&self) -> Correlation {
        match self.get(GUID_KEY) {
            None | Some(BundleValue::Null) => Correlation::Missing,
            Some(BundleValue::String(s)) if !s.is_empty() => Correlation::Present(s.clone()),
            Some(_) => Correlation::Malformed,
        }
    }
}

impl Envelope for Value {
    fn event_type(&self) -> Option<&str> {
        self.get(TYPE_KEY)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
    }

    fn correlation(&self) -> Correlation {
        match self.get(GUID_KEY) {
            None | Some(Value::Null) => Correlation::Missing,
            Some(Value::String(s)) if !s.is_empty() => Correlation::Present(s.clone()),
            Some(_) => Correlation::Malformed,
        }
    }
}

/// Builds the response message for a request of type `event`.
pub fn response_message(event: &str, guid: &str, kind: ResponseKind, payload: Value) -> Value {
    json!({
        TYPE_KEY: format!("{event}{}", kind.suffix()),
        GUID_KEY: guid,
        RESPONSE_KEY: payload,
    })
}

/// Builds a request message of type `event` with correlation key `guid`.
///
/// Fields of an object `payload` are merged into the message; any other
/// payload is placed under `data`. Reserved keys in the payload are
/// overwritten.
pub fn request_message(event: &str, guid: &str, payload: Value) -> Value {
    let mut map = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    map.insert(TYPE_KEY.to_string(), Value::String(event.to_string()));
    map.insert(GUID_KEY.to_string(), Value::String(guid.to_string()));
    Value::Object(map)
}

/// Splits a response type into the request type and the response kind.
///
/// Returns `None` for types without a response suffix.
pub fn parse_response_type(event: &str) -> Option<(&str, ResponseKind)> {
    if let Some(base) = event.strip_suffix(RETURN_SUFFIX) {
        Some((base, ResponseKind::Return))
    } else {
        event
            .strip_suffix(ERROR_SUFFIX)
            .map(|base| (base, ResponseKind::Error))
    }
}
