//! The native message envelope.
//!
//! A [`Bundle`] is an ordered map from field name to [`BundleValue`]. Unlike
//! JSON it keeps integers and doubles apart, carries raw bytes without
//! encoding them, and can hold [`NativeHandle`]s that only make sense inside
//! the process that created them.

use std::collections::BTreeMap;
use std::fmt;

use crate::envelope::TYPE_KEY;

/// Opaque reference to a native object owned by one side of the bridge.
///
/// Handles cannot be serialized; a bundle carrying one cannot be converted to
/// the structured representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

/// A single value inside a [`Bundle`].
#[derive(Debug, Clone, PartialEq)]
pub enum BundleValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    /// Raw bytes, base64-encoded when converted to JSON.
    Bytes(Vec<u8>),
    Bundle(Bundle),
    Array(Vec<BundleValue>),
    /// Native-only payload.
    Handle(NativeHandle),
}

impl BundleValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BundleValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BundleValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BundleValue::Double(d) => Some(*d),
            BundleValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BundleValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bundle(&self) -> Option<&Bundle> {
        match self {
            BundleValue::Bundle(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<NativeHandle> {
        match self {
            BundleValue::Handle(h) => Some(*h),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BundleValue::Null)
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for BundleValue {
                fn from(value: $ty) -> Self {
                    BundleValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f64 => Double,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    Bundle => Bundle,
    Vec<BundleValue> => Array,
    NativeHandle => Handle,
}

/// Native message envelope: named, typed fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bundle {
    fields: BTreeMap<String, BundleValue>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bundle whose `type` field is `event`.
    pub fn with_type(event: impl Into<String>) -> Self {
        let mut bundle = Self::new();
        bundle.put(TYPE_KEY, event.into());
        bundle
    }

    /// Builder-style [`put`](Self::put).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<BundleValue>) -> Self {
        self.put(key, value);
        self
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<BundleValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&BundleValue> {
        self.fields.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<BundleValue> {
        self.fields.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Returns the string stored at `key`, or `None` if absent or not a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(BundleValue::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(BundleValue::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(BundleValue::as_bool)
    }

    pub fn get_bundle(&self, key: &str) -> Option<&Bundle> {
        self.get(key).and_then(BundleValue::as_bundle)
    }

    /// Native accessor for the routing key. Empty strings count as absent.
    pub fn event_type(&self) -> Option<&str> {
        self.get_str(TYPE_KEY).filter(|t| !t.is_empty())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BundleValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, BundleValue)> for Bundle {
    fn from_iter<I: IntoIterator<Item = (String, BundleValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bundle({}", self.event_type().unwrap_or("<untyped>"))?;
        if !self.is_empty() {
            write!(f, ", {} fields", self.len())?;
        }
        write!(f, ")")
    }
}
