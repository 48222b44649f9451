//! Last known self-position, persisted through a [`KeyValueStore`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rideline_core::SelfPosition;
use tracing::{debug, warn};

use crate::store::KeyValueStore;

/// Persisted cache of the rider's own last position.
///
/// Every failure is absorbed: a corrupt or unreadable entry is a miss and
/// a failed write is only logged.
#[derive(Clone)]
pub struct PositionCache {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl PositionCache {
    /// Cache stored under `key` in `store`.
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Read the cached position.
    pub async fn load(&self) -> Option<SelfPosition> {
        let raw = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %self.key, error = %e, "position cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(position) => Some(position),
            Err(e) => {
                warn!(key = %self.key, error = %e, "discarding malformed cached position");
                None
            }
        }
    }

    /// Persist `position`. Best effort.
    pub async fn save(&self, position: &SelfPosition) {
        let raw = match serde_json::to_string(position) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "position could not be encoded for the cache");
                return;
            }
        };
        match self.store.set(&self.key, raw).await {
            Ok(()) => debug!(key = %self.key, "cached self position"),
            Err(e) => warn!(key = %self.key, error = %e, "position cache write failed"),
        }
    }

    /// Whether `position` is younger than `max_age`. Timestamps in the
    /// future count as fresh.
    pub fn is_fresh(position: &SelfPosition, max_age: Duration) -> bool {
        position.is_fresh_at(Utc::now(), max_age)
    }

    /// Forget the cached position.
    pub async fn clear(&self) {
        if let Err(e) = self.store.remove(&self.key).await {
            warn!(key = %self.key, error = %e, "position cache clear failed");
        }
    }
}
