//! Runtime configuration.
//!
//! Loaded from a JSON file whose path is given explicitly or through the
//! `SHELLBUS_CONFIG` environment variable. Every field has a default, so an
//! empty object (or no file at all) is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "SHELLBUS_CONFIG";

/// Default handshake message type.
pub const DEFAULT_HANDSHAKE_EVENT: &str = "Gecko:Ready";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct BusConfig {
    /// Message type that moves the launch state to `GeckoRunning`.
    pub handshake_event: String,
    /// How long an outbound request waits for its `:Return` / `:Error`.
    pub request_timeout_ms: u64,
    /// Log empty native entries at warn (true) or debug (false) level.
    pub warn_on_empty_entries: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            handshake_event: DEFAULT_HANDSHAKE_EVENT.to_string(),
            request_timeout_ms: 30_000,
            warn_on_empty_entries: true,
        }
    }
}

impl BusConfig {
    /// Reads configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded bus config");
        Ok(config)
    }

    /// Reads configuration from `$SHELLBUS_CONFIG`, or returns defaults if unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.handshake_event.is_empty() {
            return Err(Error::Config("handshakeEvent must not be empty".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("requestTimeoutMs must be positive".to_string()));
        }
        Ok(())
    }
}
