//! The shell context: one bus, one launch-state machine, one engine queue.

use std::sync::Arc;

use serde_json::Value;
use shellbus_runtime::{
    BusConfig, Connection, EngineQueue, Error, EventDispatcher, LaunchState, LaunchStateMachine,
    OutboundSink, ReadyListener, Result, Subscriber, TransportParts,
};

/// Owns the bus and the engine-facing state for the lifetime of the process.
///
/// A `Shell` is built either around an arbitrary [`OutboundSink`] (embedding,
/// tests) or around a transport, in which case it also owns the
/// [`Connection`] that feeds inbound messages into the dispatcher.
pub struct Shell {
    config: BusConfig,
    launch: Arc<LaunchStateMachine>,
    queue: Arc<EngineQueue>,
    dispatcher: Arc<EventDispatcher>,
    ready: Subscriber,
    connection: Option<Arc<Connection>>,
}

impl Shell {
    /// Creates a shell whose engine-bound messages leave through `sink`.
    pub fn new(config: BusConfig, sink: Arc<dyn OutboundSink>) -> Result<Self> {
        let launch = Arc::new(LaunchStateMachine::new());
        let queue = Arc::new(EngineQueue::new(Arc::clone(&launch), sink));
        Self::assemble(config, launch, queue, None)
    }

    /// Creates a shell talking to the engine over `parts`.
    ///
    /// Nothing is read until [`run`](Self::run) is awaited.
    pub fn connect(config: BusConfig, parts: TransportParts) -> Result<Self> {
        let launch = Arc::new(LaunchStateMachine::new());
        let connection = Arc::new(Connection::new(parts, Arc::clone(&launch), &config));
        let queue = connection.queue();
        Self::assemble(config, launch, queue, Some(connection))
    }

    fn assemble(
        config: BusConfig,
        launch: Arc<LaunchStateMachine>,
        queue: Arc<EngineQueue>,
        connection: Option<Arc<Connection>>,
    ) -> Result<Self> {
        let dispatcher = Arc::new(EventDispatcher::with_config(queue.clone(), &config));

        let ready = Subscriber::native(ReadyListener::new(Arc::clone(&launch), Arc::clone(&queue)));
        dispatcher.register(&ready, &[config.handshake_event.as_str()])?;

        tracing::debug!(handshake = %config.handshake_event, "Shell ready");

        Ok(Self {
            config,
            launch,
            queue,
            dispatcher,
            ready,
            connection,
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn launch_state(&self) -> &Arc<LaunchStateMachine> {
        &self.launch
    }

    /// Sender-side queue for engine-bound messages.
    pub fn queue(&self) -> &Arc<EngineQueue> {
        &self.queue
    }

    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.connection.as_ref()
    }

    pub fn check_launch_state(&self, state: LaunchState) -> bool {
        self.launch.check_launch_state(state)
    }

    /// Sends `message` towards the engine, queueing it until the engine runs.
    pub fn send(&self, message: Value) -> Result<()> {
        self.queue.send(message)
    }

    /// Sends a request to the engine and waits for its `:Return`.
    pub async fn request(&self, event: &str, payload: Value) -> Result<Value> {
        let connection = self.connection.as_ref().ok_or_else(|| {
            Error::ProtocolError("Shell has no engine connection".to_string())
        })?;
        connection.request(event, payload).await
    }

    /// Pumps engine messages into the dispatcher until the engine disconnects.
    pub async fn run(&self) -> Result<()> {
        let connection = self.connection.as_ref().ok_or_else(|| {
            Error::ProtocolError("Shell has no engine connection".to_string())
        })?;
        connection.run(Arc::clone(&self.dispatcher)).await
    }

    /// Moves to [`LaunchState::GeckoExiting`] and stops engine traffic.
    ///
    /// Unregisters the handshake listener and drops queued messages. Later
    /// sends fail with [`Error::EngineExiting`]. Calling this twice is a no-op.
    pub fn shutdown(&self) {
        let Some(previous) = self.launch.mark_exiting() else {
            tracing::debug!("Shell already shutting down");
            return;
        };

        if let Err(e) = self
            .dispatcher
            .unregister(&self.ready, &[self.config.handshake_event.as_str()])
        {
            tracing::warn!("Failed to unregister handshake listener: {}", e);
        }

        let dropped = self.queue.clear();
        tracing::info!(from = %previous, dropped, "Shell shut down");
    }
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("state", &self.launch.current())
            .field("queue", &self.queue)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}
