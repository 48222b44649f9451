//! Transport, registration, location, and subscription settings.
//!
//! Every interval is stored in milliseconds for the JSON file and exposed
//! as a [`Duration`] through an accessor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transport retry, ack and liveness settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay_ms: u64,
    /// Give up after this many consecutive failed attempts. `None` retries forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,
    /// How long to wait for a server ack.
    pub ack_timeout_ms: u64,
    /// Interval between client Ping frames.
    pub ping_interval_ms: u64,
    /// Drop the socket when no Pong arrived for this long.
    pub pong_timeout_ms: u64,
    /// Capacity of the transport event channel.
    pub event_buffer: usize,
}

impl TransportSettings {
    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Ack timeout as a [`Duration`].
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Ping interval as a [`Duration`].
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Pong timeout as a [`Duration`].
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 2_000,
            max_reconnect_attempts: None,
            ack_timeout_ms: 10_000,
            ping_interval_ms: 25_000,
            pong_timeout_ms: 60_000,
            event_buffer: 256,
        }
    }
}

/// Presence registration settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationSettings {
    /// Registration attempts closer together than this are suppressed.
    pub cooldown_ms: u64,
}

impl RegistrationSettings {
    /// Cooldown as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self { cooldown_ms: 3_000 }
    }
}

/// Self-position cache and reporting settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationSettings {
    /// Cached positions older than this are not used for registration.
    pub max_cache_age_ms: u64,
    /// Interval between `rider:updateLocation` pushes.
    pub update_interval_ms: u64,
    /// Key of the cached position record in the key-value store.
    pub cache_key: String,
    /// Directory for the file-backed store. `None` keeps the cache in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
}

impl LocationSettings {
    /// Staleness threshold as a [`Duration`].
    pub fn max_cache_age(&self) -> Duration {
        Duration::from_millis(self.max_cache_age_ms)
    }

    /// Update interval as a [`Duration`].
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            max_cache_age_ms: 120_000,
            update_interval_ms: 10_000,
            cache_key: "rideline.lastPosition".to_string(),
            cache_dir: None,
        }
    }
}

/// Driver subscription debounce settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionSettings {
    /// A subscribe call this soon after the previous one is dropped.
    pub subscribe_debounce_ms: u64,
    /// An unsubscribe call this soon after the previous one is dropped.
    pub unsubscribe_debounce_ms: u64,
}

impl SubscriptionSettings {
    /// Subscribe debounce window as a [`Duration`].
    pub fn subscribe_debounce(&self) -> Duration {
        Duration::from_millis(self.subscribe_debounce_ms)
    }

    /// Unsubscribe debounce window as a [`Duration`].
    pub fn unsubscribe_debounce(&self) -> Duration {
        Duration::from_millis(self.unsubscribe_debounce_ms)
    }
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            subscribe_debounce_ms: 1_000,
            unsubscribe_debounce_ms: 1_000,
        }
    }
}
