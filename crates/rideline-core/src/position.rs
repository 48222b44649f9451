//! Geographic position types.
//!
//! [`SelfPosition`] is the rider device's own fix, persisted by the position
//! cache and reported upstream. [`RemotePositionEvent`] is a driver update
//! pushed by the server; it is never persisted.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse accuracy bucket reported by the device location provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyClass {
    /// GPS-grade fix.
    High,
    /// Network-assisted fix.
    Balanced,
    /// Cell or IP based estimate.
    Low,
    /// The provider did not say.
    #[default]
    Unknown,
}

/// The rider device's position at a point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfPosition {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Accuracy bucket of the fix.
    #[serde(default)]
    pub accuracy: AccuracyClass,
    /// When the fix was taken.
    pub captured_at: DateTime<Utc>,
}

impl SelfPosition {
    /// A position captured now.
    pub fn now(latitude: f64, longitude: f64, accuracy: AccuracyClass) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            captured_at: Utc::now(),
        }
    }

    /// Age of the fix relative to `now`. Fixes stamped in the future have zero age.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.captured_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether the fix is no older than `max_age` at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age_at(now) <= max_age
    }
}

/// A driver position pushed by the server.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemotePositionEvent {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Direction of travel, degrees clockwise from north.
    pub heading_deg: f64,
}
