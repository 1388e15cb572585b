//! shellbus: event bus between a browser shell and its embedded engine
//!
//! This crate ties the runtime pieces together into a [`Shell`] and ships the
//! bus consumers the shell itself needs.
//!
//! # Examples
//!
//! ```ignore
//! use std::sync::Arc;
//! use shellbus::{BusConfig, Bundle, RecordingSink, Shell, Subscriber};
//!
//! let shell = Shell::new(BusConfig::default(), Arc::new(RecordingSink::new()))?;
//!
//! shell.dispatcher().register(
//!     &Subscriber::native(|event: &str, tab: &Bundle| {
//!         println!("{event}: {:?}", tab.get_i64("tabID"));
//!     }),
//!     &["Tab:Selected"],
//! )?;
//!
//! // Held in the queue until the engine says it is ready.
//! shell.send(serde_json::json!({"type": "Session:Restore"}))?;
//! shell.dispatcher().dispatch(&Bundle::with_type("Gecko:Ready"));
//! ```
//!
//! # Consumers
//!
//! - [`PreferencesStore`]: structured subscriber and responder for preferences
//! - [`NotificationClient`]: native subscriber feeding a [`NotificationPresenter`]

pub mod notifications;
pub mod prefs;
mod shell;

pub use notifications::{Notification, NotificationClient, NotificationPresenter};
pub use prefs::PreferencesStore;
pub use shell::Shell;

pub use shellbus_protocol::{
    Bundle, BundleValue, ConversionError, Envelope, NativeHandle, bundle_to_json, json_to_bundle,
};
pub use shellbus_runtime::{
    BundleListener, BusConfig, Connection, Dispatched, EngineQueue, Error, EventDispatcher,
    JsonListener, LaunchState, LaunchStateMachine, OutboundSink, PipeTransport, RecordingSink,
    Responder, Result, SerialWorker, Subscriber,
};
