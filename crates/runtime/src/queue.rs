//! Sender-side queue for engine-bound messages.
//!
//! The dispatcher does not know whether the engine is ready. Senders go
//! through an [`EngineQueue`] instead of the raw sink: messages produced before
//! [`LaunchState::GeckoRunning`] are held in FIFO order and released by
//! [`EngineQueue::flush`] once the handshake arrives.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::launch_state::{LaunchState, LaunchStateMachine};
use crate::outbound::OutboundSink;

pub struct EngineQueue {
    launch: Arc<LaunchStateMachine>,
    sink: Arc<dyn OutboundSink>,
    pending: Mutex<VecDeque<Value>>,
}

impl EngineQueue {
    pub fn new(launch: Arc<LaunchStateMachine>, sink: Arc<dyn OutboundSink>) -> Self {
        Self {
            launch,
            sink,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn launch_state(&self) -> &Arc<LaunchStateMachine> {
        &self.launch
    }

    /// Messages waiting for the engine.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Sends everything held back so far, if the engine is running.
    ///
    /// Returns the number of messages released.
    pub fn flush(&self) -> usize {
        let mut pending = self.pending.lock();
        match self.launch.current() {
            LaunchState::GeckoRunning => self.drain(&mut pending),
            LaunchState::GeckoExiting => {
                Self::discard(&mut pending);
                0
            }
            _ => 0,
        }
    }

    /// Drops queued messages without sending them.
    pub fn clear(&self) -> usize {
        let mut pending = self.pending.lock();
        let dropped = pending.len();
        Self::discard(&mut pending);
        dropped
    }

    // Runs with `pending` locked so a message sent right after the state
    // flips cannot overtake older queued ones.
    fn drain(&self, pending: &mut VecDeque<Value>) -> usize {
        let mut sent = 0;
        while let Some(message) = pending.pop_front() {
            if let Err(e) = self.sink.send(message) {
                tracing::error!("Failed to flush queued message: {}", e);
                break;
            }
            sent += 1;
        }
        if sent > 0 {
            tracing::debug!(sent, "Flushed queued engine messages");
        }
        sent
    }

    fn discard(pending: &mut VecDeque<Value>) {
        if !pending.is_empty() {
            tracing::warn!(dropped = pending.len(), "Dropping queued messages, engine is exiting");
            pending.clear();
        }
    }
}

impl OutboundSink for EngineQueue {
    fn send(&self, message: Value) -> Result<()> {
        let mut pending = self.pending.lock();
        match self.launch.current() {
            LaunchState::GeckoRunning => {
                self.drain(&mut pending);
                self.sink.send(message)
            }
            LaunchState::GeckoExiting => {
                tracing::warn!("Dropping message for exiting engine: {}", message);
                Err(Error::EngineExiting)
            }
            state => {
                tracing::debug!(%state, "Engine not running, queueing message");
                pending.push_back(message);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for EngineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineQueue")
            .field("state", &self.launch.current())
            .field("pending", &self.pending_len())
            .finish()
    }
}
