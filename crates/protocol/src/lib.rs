//! Wire types for the shellbus event bus.
//!
//! Every message exchanged between the browser shell and the embedded engine
//! exists in one of two shapes:
//!
//! - [`Bundle`]: the native envelope. Typed values, cheap to read, and able to
//!   carry payloads that have no textual form (raw bytes, [`NativeHandle`]s).
//! - Structured JSON ([`serde_json::Value`]): the generic tree-of-maps form
//!   used by older subscribers and by the pipe transport.
//!
//! [`convert`] moves between the two, and [`envelope`] holds the reserved
//! field names and the `:Return` / `:Error` response convention.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No routing or threading behavior
//! - **Representation-neutral**: The [`Envelope`] trait reads routing fields
//!   from either shape
//! - **Stable**: Changes only when the wire contract changes

pub mod bundle;
pub mod convert;
pub mod envelope;

pub use bundle::*;
pub use convert::{ConversionError, bundle_to_json, json_to_bundle};
pub use envelope::*;
