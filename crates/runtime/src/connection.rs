//! Engine connection: request correlation on top of the transport.
//!
//! Outbound requests carry a `GUID` and resolve when the engine answers with
//! a `<type>:Return` or `<type>:Error` message carrying the same `GUID`.
//! Everything else the engine sends is converted to a [`Bundle`] and handed
//! to the [`EventDispatcher`].
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Connection::request`] with a type and payload
//! 2. Connection generates a `GUID` and parks a oneshot sender under it
//! 3. The request goes through the [`EngineQueue`], held until the engine runs
//! 4. The run loop receives `<type>:Return` / `<type>:Error` from the transport
//! 5. The pending sender is looked up by `GUID` and completed
//! 6. The caller's future resolves, or times out and removes its entry

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use shellbus_protocol::{
    Correlation, Envelope, RESPONSE_KEY, ResponseKind, json_to_bundle,
    parse_response_type, request_message,
};
use tokio::sync::{mpsc, oneshot};

use crate::config::BusConfig;
use crate::dispatcher::EventDispatcher;
use crate::error::{Error, Result};
use crate::launch_state::LaunchStateMachine;
use crate::outbound::{ChannelSink, OutboundSink};
use crate::queue::EngineQueue;
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Prefix of correlation keys generated by this side.
pub const GUID_PREFIX: &str = "shell-";

/// Pending requests keyed by `GUID`.
type PendingMap = Arc<DashMap<String, oneshot::Sender<Result<Value>>>>;

/// Removes the pending entry if the request future is dropped early.
struct CancelGuard {
    guid: String,
    pending: PendingMap,
    completed: bool,
}

impl CancelGuard {
    fn new(guid: String, pending: PendingMap) -> Self {
        Self {
            guid,
            pending,
            completed: false,
        }
    }

    fn complete(&mut self) {
        self.completed = true;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if self.pending.remove(&self.guid).is_some() {
            tracing::debug!(guid = %self.guid, "CancelGuard: removed orphaned request");
        }
    }
}

/// Future returned by [`Connection::request`].
struct ResponseFuture {
    rx: oneshot::Receiver<Result<Value>>,
    guard: CancelGuard,
}

impl Future for ResponseFuture {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(result) => {
                self.guard.complete();
                Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Bridge between the shell-side bus and the engine process.
pub struct Connection {
    last_id: AtomicU64,
    pending: PendingMap,
    queue: Arc<EngineQueue>,
    request_timeout: Duration,
    /// Taken by `run()`.
    transport_sender: Mutex<Option<Box<dyn Transport>>>,
    transport_receiver: Mutex<Option<Box<dyn TransportReceiver>>>,
    message_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
}

impl Connection {
    /// Creates a connection over `parts`.
    ///
    /// Outbound traffic is gated on `launch`: nothing is written to the
    /// transport until the state reaches
    /// [`LaunchState::GeckoRunning`](crate::LaunchState::GeckoRunning).
    pub fn new(parts: TransportParts, launch: Arc<LaunchStateMachine>, config: &BusConfig) -> Self {
        let TransportParts {
            sender,
            receiver,
            message_rx,
        } = parts;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn OutboundSink> = Arc::new(ChannelSink::new(outbound_tx));

        Self {
            last_id: AtomicU64::new(0),
            pending: Arc::new(DashMap::new()),
            queue: Arc::new(EngineQueue::new(launch, sink)),
            request_timeout: config.request_timeout(),
            transport_sender: Mutex::new(Some(sender)),
            transport_receiver: Mutex::new(Some(receiver)),
            message_rx: Mutex::new(Some(message_rx)),
            outbound_rx: Mutex::new(Some(outbound_rx)),
        }
    }

    /// The launch-gated outbound queue. Hand this to the dispatcher so its
    /// responses share the same ordering.
    pub fn queue(&self) -> Arc<EngineQueue> {
        Arc::clone(&self.queue)
    }

    /// Requests still waiting for an answer.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Sends a request of type `event` and waits for its answer.
    ///
    /// Resolves to the `response` field of the `:Return` message.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`] if the engine answers with `:Error`
    /// - [`Error::Timeout`] if no answer arrives within the configured timeout
    /// - [`Error::EngineExiting`] if the engine is shutting down
    /// - [`Error::ChannelClosed`] if the connection closes first
    pub async fn request(&self, event: &str, payload: Value) -> Result<Value> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst);
        let guid = format!("{GUID_PREFIX}{id}");

        tracing::debug!(event, guid = %guid, "Sending request");

        let (tx, rx) = oneshot::channel();
        self.pending.insert(guid.clone(), tx);
        let guard = CancelGuard::new(guid.clone(), Arc::clone(&self.pending));

        self.queue.send(request_message(event, &guid, payload))?;

        tokio::time::timeout(self.request_timeout, ResponseFuture { rx, guard })
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "Timeout waiting for '{event}' response after {}ms",
                    self.request_timeout.as_millis()
                ))
            })?
    }

    /// Runs the message loop until the engine closes its end.
    ///
    /// Inbound messages are resolved against pending requests or dispatched
    /// through `dispatcher`. Listeners run on this task and must not block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolError`] if called more than once.
    pub async fn run(&self, dispatcher: Arc<EventDispatcher>) -> Result<()> {
        let (transport_receiver, mut transport_sender, mut outbound_rx, mut message_rx) = match (
            self.transport_receiver.lock().take(),
            self.transport_sender.lock().take(),
            self.outbound_rx.lock().take(),
            self.message_rx.lock().take(),
        ) {
            (Some(receiver), Some(sender), Some(outbound_rx), Some(message_rx)) => {
                (receiver, sender, outbound_rx, message_rx)
            }
            _ => {
                return Err(Error::ProtocolError(
                    "run() can only be called once".to_string(),
                ));
            }
        };

        let reader_handle = tokio::spawn(async move {
            if let Err(e) = transport_receiver.run().await {
                tracing::error!("Transport read error: {}", e);
            }
        });

        let writer_handle = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = transport_sender.send(message).await {
                    tracing::error!("Transport write error: {}", e);
                    break;
                }
            }
        });

        while let Some(message) = message_rx.recv().await {
            self.handle_inbound(&dispatcher, message);
        }

        tracing::info!(
            pending = self.pending.len(),
            "Engine closed the connection"
        );
        // Dropping the senders fails every outstanding request with ChannelClosed.
        self.pending.clear();

        let _ = reader_handle.await;
        // The queue keeps the outbound channel open; the writer has nothing
        // left to write to.
        writer_handle.abort();
        Ok(())
    }

    pub(crate) fn handle_inbound(&self, dispatcher: &EventDispatcher, message: Value) {
        if self.try_complete(&message) {
            return;
        }

        match json_to_bundle(&message) {
            Ok(bundle) => {
                dispatcher.dispatch(&bundle);
            }
            Err(e) => {
                tracing::error!("Failed to convert inbound message: {}", e);
            }
        }
    }

    /// Completes a pending request if `message` answers one.
    fn try_complete(&self, message: &Value) -> bool {
        let Some((event, kind)) = message.event_type().and_then(parse_response_type) else {
            return false;
        };
        let Correlation::Present(guid) = message.correlation() else {
            return false;
        };
        // Answers to requests made by someone else are ordinary messages.
        let Some((_, tx)) = self.pending.remove(&guid) else {
            return false;
        };

        let payload = message.get(RESPONSE_KEY).cloned().unwrap_or(Value::Null);
        tracing::debug!(event, guid = %guid, ?kind, "Received response");

        let result = match kind {
            ResponseKind::Return => Ok(payload),
            ResponseKind::Error => Err(Error::Remote {
                event: event.to_string(),
                payload,
            }),
        };
        let _ = tx.send(result);
        true
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("pending", &self.pending.len())
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests;
