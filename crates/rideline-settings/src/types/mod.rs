//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial
//! JSON is accepted and missing fields get their production default.

mod session;

pub use session::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the rideline client.
///
/// ```json
/// {
///   "server": { "url": "wss://location.example.com/ws" },
///   "subscription": { "subscribeDebounceMs": 500 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Location server endpoint.
    pub server: ServerSettings,
    /// Transport retry, ack and liveness settings.
    pub transport: TransportSettings,
    /// Presence registration settings.
    pub registration: RegistrationSettings,
    /// Self-position cache and reporting settings.
    pub location: LocationSettings,
    /// Driver subscription debounce settings.
    pub subscription: SubscriptionSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl ClientSettings {
    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.url.is_empty() {
            return Err(SettingsError::InvalidValue("server.url must not be empty".into()));
        }
        let non_zero = [
            ("transport.reconnectDelayMs", self.transport.reconnect_delay_ms),
            ("transport.ackTimeoutMs", self.transport.ack_timeout_ms),
            ("transport.pingIntervalMs", self.transport.ping_interval_ms),
            ("transport.pongTimeoutMs", self.transport.pong_timeout_ms),
            ("location.updateIntervalMs", self.location.update_interval_ms),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!("{name} must be > 0")));
            }
        }
        if self.transport.event_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "transport.eventBuffer must be > 0".into(),
            ));
        }
        if self.location.cache_key.is_empty() {
            return Err(SettingsError::InvalidValue(
                "location.cacheKey must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Location server endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// WebSocket URL of the location server.
    pub url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3000/ws".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
