//! Engine launch-state machine.
//!
//! ```text
//!  Launching ──► WaitForDebugger ──► Launching
//!      │
//!      ├───────► Launched ──┐
//!      │                    ▼
//!      └─────────────► GeckoRunning      (on the handshake event)
//!
//!  any state ─────► GeckoExiting         (terminal)
//! ```
//!
//! The state is a single atomic. [`LaunchStateMachine::check_and_set`] is the
//! only mutation primitive; every other read is a snapshot.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use shellbus_protocol::Bundle;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::listener::BundleListener;
use crate::queue::EngineQueue;

/// Boot progress of the embedded engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LaunchState {
    Launching = 0,
    WaitForDebugger = 1,
    Launched = 2,
    GeckoRunning = 3,
    GeckoExiting = 4,
}

impl LaunchState {
    pub const ALL: [LaunchState; 5] = [
        LaunchState::Launching,
        LaunchState::WaitForDebugger,
        LaunchState::Launched,
        LaunchState::GeckoRunning,
        LaunchState::GeckoExiting,
    ];

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LaunchState::Launching,
            1 => LaunchState::WaitForDebugger,
            2 => LaunchState::Launched,
            3 => LaunchState::GeckoRunning,
            _ => LaunchState::GeckoExiting,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LaunchState::Launching => "Launching",
            LaunchState::WaitForDebugger => "WaitForDebugger",
            LaunchState::Launched => "Launched",
            LaunchState::GeckoRunning => "GeckoRunning",
            LaunchState::GeckoExiting => "GeckoExiting",
        }
    }

    /// States this one normally moves to.
    pub fn successors(self) -> &'static [LaunchState] {
        match self {
            LaunchState::Launching => &[
                LaunchState::WaitForDebugger,
                LaunchState::Launched,
                LaunchState::GeckoRunning,
                LaunchState::GeckoExiting,
            ],
            LaunchState::WaitForDebugger => &[LaunchState::Launching, LaunchState::GeckoExiting],
            LaunchState::Launched => &[LaunchState::GeckoRunning, LaunchState::GeckoExiting],
            LaunchState::GeckoRunning => &[LaunchState::GeckoExiting],
            LaunchState::GeckoExiting => &[],
        }
    }
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-lifetime tracker for engine startup.
pub struct LaunchStateMachine {
    state: AtomicU8,
    changed: Notify,
}

impl Default for LaunchStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LaunchStateMachine {
    /// Creates a machine in [`LaunchState::Launching`].
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LaunchState::Launching as u8),
            changed: Notify::new(),
        }
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> LaunchState {
        LaunchState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns true if the current state is `state`.
    pub fn check_launch_state(&self, state: LaunchState) -> bool {
        self.current() == state
    }

    pub fn is_running(&self) -> bool {
        self.check_launch_state(LaunchState::GeckoRunning)
    }

    /// Moves from `expected` to `next` if the state is still `expected`.
    ///
    /// Exactly one of several concurrent callers with the same `expected`
    /// succeeds. A `false` return means another caller got there first.
    pub fn check_and_set(&self, expected: LaunchState, next: LaunchState) -> bool {
        let won = self
            .state
            .compare_exchange(
                expected as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if won {
            tracing::debug!(from = %expected, to = %next, "Launch state changed");
            self.changed.notify_waiters();
        }
        won
    }

    /// Moves to [`LaunchState::GeckoExiting`] from whatever state is current.
    ///
    /// Returns the state that was left, or `None` if already exiting.
    pub fn mark_exiting(&self) -> Option<LaunchState> {
        loop {
            let current = self.current();
            if current == LaunchState::GeckoExiting {
                return None;
            }
            if self.check_and_set(current, LaunchState::GeckoExiting) {
                return Some(current);
            }
        }
    }

    /// Waits until the state is `target`.
    ///
    /// Fails with [`Error::EngineExiting`] if the engine starts exiting first,
    /// or [`Error::Timeout`] once `timeout` elapses.
    pub async fn wait_for(&self, target: LaunchState, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Registered before the check so a transition in between is not lost.
            let notified = self.changed.notified();

            match self.current() {
                state if state == target => return Ok(()),
                LaunchState::GeckoExiting => return Err(Error::EngineExiting),
                _ => {}
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(Self::timeout_error(target));
            }

            tokio::select! {
                biased;
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => {
                    return Err(Self::timeout_error(target));
                }
            }
        }
    }

    fn timeout_error(target: LaunchState) -> Error {
        Error::Timeout(format!("Timeout waiting for launch state {target}"))
    }
}

impl fmt::Debug for LaunchStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchStateMachine")
            .field("state", &self.current())
            .finish()
    }
}

/// Subscriber for the handshake event.
///
/// Moves the launch state to [`LaunchState::GeckoRunning`] and releases
/// whatever senders queued while the engine was starting.
pub struct ReadyListener {
    launch: Arc<LaunchStateMachine>,
    queue: Arc<EngineQueue>,
}

impl ReadyListener {
    pub fn new(launch: Arc<LaunchStateMachine>, queue: Arc<EngineQueue>) -> Self {
        Self { launch, queue }
    }
}

impl BundleListener for ReadyListener {
    fn handle_message(&self, event: &str, _message: &Bundle) {
        let won = self
            .launch
            .check_and_set(LaunchState::Launched, LaunchState::GeckoRunning)
            || self
                .launch
                .check_and_set(LaunchState::Launching, LaunchState::GeckoRunning);

        if won {
            tracing::info!(event, "Engine is running");
            self.queue.flush();
        } else {
            tracing::debug!(
                event,
                state = %self.launch.current(),
                "Handshake ignored, launch state already moved"
            );
        }
    }
}
