//! Outbound message sinks.
//!
//! Everything the shell sends towards the engine, including responses built by
//! [`EventDispatcher::send_response`](crate::EventDispatcher::send_response),
//! leaves through an [`OutboundSink`].

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Destination for outbound messages.
pub trait OutboundSink: Send + Sync {
    /// Hands `message` to the sink. Must not block.
    fn send(&self, message: Value) -> Result<()>;
}

/// Sink backed by an unbounded channel, drained by a writer task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Value>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Value>) -> Self {
        Self { tx }
    }
}

impl OutboundSink for ChannelSink {
    fn send(&self, message: Value) -> Result<()> {
        self.tx.send(message).map_err(|_| {
            tracing::error!("Failed to queue message: outbound channel closed");
            Error::ChannelClosed
        })
    }
}

/// Sink that keeps every message in memory.
///
/// Used by tests and by the `replay` command to show what would have been
/// sent to the engine.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<Value>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and clears the recorded messages.
    pub fn take(&self) -> Vec<Value> {
        std::mem::take(&mut *self.messages.lock())
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl OutboundSink for RecordingSink {
    fn send(&self, message: Value) -> Result<()> {
        self.messages.lock().push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_sink_reports_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.send(json!({"type": "a"})).unwrap();
        drop(rx);
        assert!(matches!(
            sink.send(json!({"type": "b"})),
            Err(Error::ChannelClosed)
        ));
    }

    #[test]
    fn test_recording_sink_take_clears() {
        let sink = RecordingSink::new();
        sink.send(json!({"type": "a"})).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.take(), vec![json!({"type": "a"})]);
        assert!(sink.is_empty());
    }
}
