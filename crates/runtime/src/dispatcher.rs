//! Event dispatcher: the routing core of the bus.
//!
//! Inbound messages are classified by their `type` and routed to exactly one
//! of two registries:
//!
//! ```text
//!               ┌───────────────┐  entry exists  ┌──────────────────┐
//!  Bundle ────► │ native lookup │ ─────────────► │ BundleListeners  │
//!               └───────┬───────┘  (even empty)  └──────────────────┘
//!                       │ no entry
//!               ┌───────▼───────┐                ┌──────────────────┐
//!               │ to JSON, type │ ─────────────► │ JsonListeners    │
//!               └───────────────┘                └──────────────────┘
//! ```
//!
//! An existing native entry, even one with no listeners left, claims the type:
//! the structured path is never consulted for it. Only the absence of a native
//! entry lets a message fall through to conversion.
//!
//! # Threading
//!
//! Register, unregister, and dispatch may be called from any thread. Each
//! registry has its own lock; dispatch only holds it long enough to clone the
//! entry snapshot and invokes listeners with no lock held.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use shellbus_protocol::{
    Bundle, Correlation, Envelope, ResponseKind, bundle_to_json, response_message,
};

use crate::config::BusConfig;
use crate::error::{Error, Result};
use crate::listener::{
    BundleListener, JsonListener, ListenerKind, Responder, Subscriber, listener_addr,
};
use crate::outbound::OutboundSink;
use crate::registry::ListenerRegistry;

/// How a dispatched message was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Delivered through the native registry to this many listeners.
    Native(usize),
    /// Delivered through the structured registry to this many listeners.
    Structured(usize),
    /// Routable, but nothing is registered for the type.
    Unhandled,
    /// Abandoned: not convertible, or no `type` field.
    Dropped,
}

impl Dispatched {
    /// Number of listeners invoked.
    pub fn delivered(self) -> usize {
        match self {
            Dispatched::Native(n) | Dispatched::Structured(n) => n,
            Dispatched::Unhandled | Dispatched::Dropped => 0,
        }
    }
}

/// Cross-thread publish/subscribe router.
pub struct EventDispatcher {
    native: ListenerRegistry<dyn BundleListener>,
    structured: ListenerRegistry<dyn JsonListener>,
    /// Responders currently inside `get_response`, by listener address.
    responding: Mutex<HashSet<usize>>,
    outbound: Arc<dyn OutboundSink>,
    warn_on_empty_entries: bool,
}

impl EventDispatcher {
    /// Creates a dispatcher whose responses leave through `outbound`.
    pub fn new(outbound: Arc<dyn OutboundSink>) -> Self {
        Self::with_config(outbound, &BusConfig::default())
    }

    pub fn with_config(outbound: Arc<dyn OutboundSink>, config: &BusConfig) -> Self {
        Self {
            native: ListenerRegistry::new(ListenerKind::Native),
            structured: ListenerRegistry::new(ListenerKind::Structured),
            responding: Mutex::new(HashSet::new()),
            outbound,
            warn_on_empty_entries: config.warn_on_empty_entries,
        }
    }

    /// Subscribes `subscriber` to every type in `events`.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] if one of `events` is registered under the
    ///   other delivery convention.
    /// - [`Error::IllegalArgument`] if one of `events` is empty.
    ///
    /// On error nothing is registered.
    pub fn register(&self, subscriber: &Subscriber, events: &[&str]) -> Result<()> {
        if let Some(empty) = events.iter().find(|e| e.is_empty()) {
            return Err(Error::IllegalArgument {
                event: (*empty).to_string(),
            });
        }

        match subscriber {
            Subscriber::Native(listener) => {
                Self::check_unclaimed(&self.structured, events)?;
                self.native.add(listener, events);
            }
            Subscriber::Structured(listener) => {
                Self::check_unclaimed(&self.native, events)?;
                self.structured.add(listener, events);
            }
        }

        tracing::debug!(kind = %subscriber.kind(), ?events, "Registered listener");
        Ok(())
    }

    /// Removes `subscriber` from every type in `events`.
    ///
    /// # Errors
    ///
    /// [`Error::IllegalArgument`] if `subscriber` is not registered for one of
    /// `events`; nothing is removed in that case.
    pub fn unregister(&self, subscriber: &Subscriber, events: &[&str]) -> Result<()> {
        match subscriber {
            Subscriber::Native(listener) => self.native.remove(listener, events)?,
            Subscriber::Structured(listener) => self.structured.remove(listener, events)?,
        }

        tracing::debug!(kind = %subscriber.kind(), ?events, "Unregistered listener");
        Ok(())
    }

    /// Returns true if either registry has an entry for `event`.
    pub fn has_listener(&self, event: &str) -> bool {
        self.native.contains(event) || self.structured.contains(event)
    }

    /// Registered types of one registry, sorted.
    pub fn registered_events(&self, kind: ListenerKind) -> Vec<String> {
        match kind {
            ListenerKind::Native => self.native.events(),
            ListenerKind::Structured => self.structured.events(),
        }
    }

    /// Number of listeners registered for `event`, across both registries.
    pub fn listener_count(&self, event: &str) -> usize {
        self.native.listener_count(event) + self.structured.listener_count(event)
    }

    /// Routes `message` to its subscribers.
    ///
    /// Data errors are logged and reported as [`Dispatched::Dropped`]; they
    /// never reach the caller as errors.
    pub fn dispatch(&self, message: &Bundle) -> Dispatched {
        if let Some(routed) = self.dispatch_native(message) {
            return routed;
        }

        match self.to_structured(message) {
            Ok((event, json)) => match self.structured.snapshot(&event) {
                Some(listeners) if !listeners.is_empty() => {
                    for listener in listeners.iter() {
                        listener.handle_message(&event, &json);
                    }
                    Dispatched::Structured(listeners.len())
                }
                _ => {
                    tracing::debug!(event = %event, "No listeners for event");
                    Dispatched::Unhandled
                }
            },
            Err(e) => {
                Self::log_data_error(message, &e);
                Dispatched::Dropped
            }
        }
    }

    /// Routes `message` and collects a synchronous reply.
    ///
    /// Structured listeners are invoked in order; the first one that has a
    /// [`Responder`](crate::Responder) capability and returns `Some` supplies
    /// the reply. Natively routed messages never produce a reply.
    pub fn dispatch_sync(&self, message: &Bundle) -> Option<Value> {
        if self.dispatch_native(message).is_some() {
            return None;
        }

        let (event, json) = match self.to_structured(message) {
            Ok(routed) => routed,
            Err(e) => {
                Self::log_data_error(message, &e);
                return None;
            }
        };

        let Some(listeners) = self.structured.snapshot(&event).filter(|l| !l.is_empty()) else {
            tracing::debug!(event = %event, "No listeners for synchronous request");
            return None;
        };

        let mut reply = None;
        for listener in listeners.iter() {
            listener.handle_message(&event, &json);
            if reply.is_none() {
                if let Some(responder) = listener.as_responder() {
                    reply = self.ask_responder(listener_addr(listener), responder, &event, &json);
                }
            }
        }
        reply
    }

    /// Publishes the `:Return` reply to `original`.
    pub fn send_response<M: Envelope + ?Sized>(&self, original: &M, payload: Value) {
        if let Err(e) = self.respond(original, ResponseKind::Return, payload) {
            tracing::error!("Failed to send response: {}", e);
        }
    }

    /// Publishes the `:Error` reply to `original`.
    pub fn send_error<M: Envelope + ?Sized>(&self, original: &M, payload: Value) {
        if let Err(e) = self.respond(original, ResponseKind::Error, payload) {
            tracing::error!("Failed to send error response: {}", e);
        }
    }

    /// Native half of routing. `None` means the message falls through.
    fn dispatch_native(&self, message: &Bundle) -> Option<Dispatched> {
        let event = message.event_type()?;
        let listeners = self.native.snapshot(event)?;

        if listeners.is_empty() {
            if self.warn_on_empty_entries {
                tracing::warn!(event, "Native entry has no listeners");
            } else {
                tracing::debug!(event, "Native entry has no listeners");
            }
        }

        for listener in listeners.iter() {
            listener.handle_message(event, message);
        }
        Some(Dispatched::Native(listeners.len()))
    }

    fn to_structured(&self, message: &Bundle) -> Result<(String, Value)> {
        let json = bundle_to_json(message)?;
        let event = json.event_type().ok_or(Error::MissingType)?.to_string();
        Ok((event, json))
    }

    fn ask_responder(
        &self,
        addr: usize,
        responder: &dyn Responder,
        event: &str,
        request: &Value,
    ) -> Option<Value> {
        let entered = self.responding.lock().insert(addr);
        if !entered {
            tracing::warn!(event, "Responder already has a request outstanding");
        }

        let reply = responder.get_response(event, request);

        if entered {
            self.responding.lock().remove(&addr);
        }
        reply
    }

    fn respond<M: Envelope + ?Sized>(
        &self,
        original: &M,
        kind: ResponseKind,
        payload: Value,
    ) -> Result<()> {
        let event = original.event_type().ok_or(Error::MissingType)?;
        let guid = match original.correlation() {
            Correlation::Present(guid) => guid,
            Correlation::Missing | Correlation::Malformed => {
                return Err(Error::MissingCorrelation {
                    event: event.to_string(),
                });
            }
        };

        tracing::debug!(event, guid = %guid, suffix = kind.suffix(), "Sending response");
        self.outbound.send(response_message(event, &guid, kind, payload))
    }

    fn check_unclaimed<L: ?Sized>(other: &ListenerRegistry<L>, events: &[&str]) -> Result<()> {
        match other.first_registered(events) {
            Some(event) => Err(Error::IllegalState {
                event: event.to_string(),
                existing: other.kind().as_str(),
            }),
            None => Ok(()),
        }
    }

    fn log_data_error(message: &Bundle, error: &Error) {
        match error {
            Error::MissingType => {
                tracing::debug!("Dropping untyped message: {}", message);
            }
            other => {
                tracing::error!("Cannot route {}: {}", message, other);
            }
        }
    }
}
