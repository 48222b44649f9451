//! Device location provider seam.

use async_trait::async_trait;
use rideline_core::{AccuracyClass, LocationError, SelfPosition};

/// Source of the rider device's current position.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Read the current position. May fail with
    /// [`LocationError::PermissionDenied`].
    async fn current_position(&self) -> Result<SelfPosition, LocationError>;
}

/// Provider that always reports the same coordinates, stamped now.
#[derive(Clone, Copy, Debug)]
pub struct FixedLocation {
    latitude: f64,
    longitude: f64,
    accuracy: AccuracyClass,
}

impl FixedLocation {
    /// Report `latitude`/`longitude` with unknown accuracy.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: AccuracyClass::Unknown,
        }
    }

    /// Set the accuracy class reported with every fix.
    #[must_use]
    pub fn with_accuracy(mut self, accuracy: AccuracyClass) -> Self {
        self.accuracy = accuracy;
        self
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_position(&self) -> Result<SelfPosition, LocationError> {
        Ok(SelfPosition::now(self.latitude, self.longitude, self.accuracy))
    }
}
