//! Error types for the shellbus runtime.

use serde_json::Value;
use shellbus_protocol::ConversionError;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the shellbus runtime.
///
/// `IllegalState` and `IllegalArgument` are wiring bugs and are returned to
/// the caller. The data errors (`Conversion`, `MissingType`,
/// `MissingCorrelation`) are produced internally and logged at the dispatch
/// boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Event type is already registered under the other delivery convention.
    #[error("Illegal state: '{event}' is already registered as a {existing} event")]
    IllegalState {
        event: String,
        existing: &'static str,
    },

    /// Subscriber is not registered for the event type being unregistered.
    #[error("Illegal argument: subscriber is not registered for '{event}'")]
    IllegalArgument { event: String },

    /// Message could not be converted to the structured representation.
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Message carries no `type` field.
    #[error("Message has no type")]
    MissingType,

    /// Request has no usable correlation key.
    #[error("No correlation key on '{event}' request")]
    MissingCorrelation { event: String },

    /// Channel closed unexpectedly.
    #[error("Channel closed unexpectedly")]
    ChannelClosed,

    /// The engine is shutting down; the awaited state can no longer be reached.
    #[error("Engine is exiting")]
    EngineExiting,

    /// Transport-level error (pipe communication).
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Protocol-level error (malformed frame or message).
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The engine answered a request with an `:Error` response.
    #[error("Engine returned an error for '{event}': {payload}")]
    Remote { event: String, payload: Value },

    /// Timeout waiting for a response or state.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for errors that indicate a subscription wiring bug.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, Error::IllegalState { .. } | Error::IllegalArgument { .. })
    }

    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Returns the engine's error payload if this is a Remote error.
    pub fn remote_payload(&self) -> Option<&Value> {
        match self {
            Error::Remote { payload, .. } => Some(payload),
            _ => None,
        }
    }
}
