//! Subscriber abstraction.
//!
//! A subscriber is either a [`BundleListener`] (native envelope) or a
//! [`JsonListener`] (structured tree). Both are wrapped in [`Subscriber`], the
//! handle passed to register and unregister. Identity is the `Arc` allocation:
//! unregistering requires a clone of the handle that was registered.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use shellbus_protocol::Bundle;

/// Subscriber operating on the native [`Bundle`] envelope.
///
/// Called on the dispatching thread, which is often the engine's message
/// pump. Implementations must not block; hand expensive work off to a
/// [`SerialWorker`](crate::SerialWorker) or a spawned task.
pub trait BundleListener: Send + Sync {
    fn handle_message(&self, event: &str, message: &Bundle);
}

/// Subscriber operating on the structured JSON representation.
pub trait JsonListener: Send + Sync {
    fn handle_message(&self, event: &str, message: &Value);

    /// Returns the synchronous reply capability, if this listener has one.
    fn as_responder(&self) -> Option<&dyn Responder> {
        None
    }
}

/// Legacy synchronous reply capability of a [`JsonListener`].
///
/// At most one request may be outstanding per responder; the dispatcher logs
/// overlapping requests but does not block them.
pub trait Responder: Send + Sync {
    fn get_response(&self, event: &str, request: &Value) -> Option<Value>;
}

impl<F> BundleListener for F
where
    F: Fn(&str, &Bundle) + Send + Sync,
{
    fn handle_message(&self, event: &str, message: &Bundle) {
        self(event, message)
    }
}

impl<F> JsonListener for F
where
    F: Fn(&str, &Value) + Send + Sync,
{
    fn handle_message(&self, event: &str, message: &Value) {
        self(event, message)
    }
}

/// Which registry a subscriber belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Native,
    Structured,
}

impl ListenerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ListenerKind::Native => "native",
            ListenerKind::Structured => "structured",
        }
    }

    pub fn other(self) -> Self {
        match self {
            ListenerKind::Native => ListenerKind::Structured,
            ListenerKind::Structured => ListenerKind::Native,
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a registered subscriber.
#[derive(Clone)]
pub enum Subscriber {
    Native(Arc<dyn BundleListener>),
    Structured(Arc<dyn JsonListener>),
}

impl Subscriber {
    pub fn native(listener: impl BundleListener + 'static) -> Self {
        Subscriber::Native(Arc::new(listener))
    }

    pub fn structured(listener: impl JsonListener + 'static) -> Self {
        Subscriber::Structured(Arc::new(listener))
    }

    pub fn kind(&self) -> ListenerKind {
        match self {
            Subscriber::Native(_) => ListenerKind::Native,
            Subscriber::Structured(_) => ListenerKind::Structured,
        }
    }

    /// Returns true if both handles refer to the same listener allocation.
    pub fn same_as(&self, other: &Subscriber) -> bool {
        match (self, other) {
            (Subscriber::Native(a), Subscriber::Native(b)) => same_listener(a, b),
            (Subscriber::Structured(a), Subscriber::Structured(b)) => same_listener(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = match self {
            Subscriber::Native(l) => listener_addr(l),
            Subscriber::Structured(l) => listener_addr(l),
        };
        f.debug_struct("Subscriber")
            .field("kind", &self.kind())
            .field("addr", &format_args!("{addr:#x}"))
            .finish()
    }
}

/// Pointer identity for listener trait objects, ignoring vtables.
pub(crate) fn same_listener<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

pub(crate) fn listener_addr<L: ?Sized>(listener: &Arc<L>) -> usize {
    Arc::as_ptr(listener) as *const () as usize
}
