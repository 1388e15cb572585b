//! shellbus runtime - event dispatch, launch state, and the engine bridge
//!
//! This crate provides the moving parts of the bus between the browser shell
//! and the embedded engine:
//!
//! - **Dispatcher**: Two subscriber registries and type-based routing
//! - **Launch state**: Atomic engine boot state and the handshake listener
//! - **Queue**: Holds engine-bound messages until the engine is running
//! - **Connection**: `GUID` request correlation over a pipe transport
//! - **Worker**: Serial off-thread execution for listeners that do real work
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────┐
//!  engine ◄──┤  Transport   │  length-prefixed JSON frames
//!            └──────┬───────┘
//!            ┌──────▼───────┐
//!            │  Connection  │  :Return / :Error correlation
//!            └──┬────────▲──┘
//!      inbound  │        │ outbound
//!            ┌──▼─────┐ ┌┴────────────┐
//!            │Dispatch│─►│ EngineQueue │  held until GeckoRunning
//!            └──┬─────┘ └─────────────┘
//!               │
//!    ┌──────────┴──────────┐
//!    ▼                     ▼
//!  BundleListener     JsonListener (+ Responder)
//! ```

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod launch_state;
pub mod listener;
pub mod outbound;
pub mod queue;
mod registry;
pub mod transport;
pub mod worker;

pub use config::{BusConfig, CONFIG_ENV, DEFAULT_HANDSHAKE_EVENT};
pub use connection::Connection;
pub use dispatcher::{Dispatched, EventDispatcher};
pub use error::{Error, Result};
pub use launch_state::{LaunchState, LaunchStateMachine, ReadyListener};
pub use listener::{BundleListener, JsonListener, ListenerKind, Responder, Subscriber};
pub use outbound::{ChannelSink, OutboundSink, RecordingSink};
pub use queue::EngineQueue;
pub use registry::Snapshot;
pub use transport::{
    PipeTransport, PipeTransportReceiver, PipeTransportSender, Transport, TransportParts,
    TransportReceiver,
};
pub use worker::SerialWorker;
