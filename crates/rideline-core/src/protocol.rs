//! Wire protocol between the rider client and the location server.
//!
//! Event names are fixed strings shared with the server. Payload structs
//! carry the server's field naming, which mixes camelCase and snake_case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ClientError;
use crate::ids::{DriverId, RiderId, SocketId};
use crate::position::SelfPosition;

/// Announce or refresh the rider's presence. Acked.
pub const REGISTER: &str = "register";
/// Periodic self-position push. Fire-and-forget.
pub const UPDATE_LOCATION: &str = "rider:updateLocation";
/// Start tracking a driver. Acked.
pub const SUBSCRIBE_TO_DRIVER: &str = "rider:subscribeToDriver";
/// Stop tracking a driver. Acked.
pub const UNSUBSCRIBE_FROM_DRIVER: &str = "rider:unsubscribeFromDriver";
/// Inbound driver position.
pub const DRIVER_LOCATION_UPDATE: &str = "driver:locationUpdate";
/// Inbound server-defined envelope for the notification router.
pub const MESSAGE: &str = "message";

/// Role this client announces itself as.
pub const RIDER_ROLE: &str = "rider";

/// Payload of [`REGISTER`] and [`UPDATE_LOCATION`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresencePayload {
    /// Transport connection the presence is bound to.
    #[serde(rename = "socketId")]
    pub socket_id: SocketId,
    /// Always [`RIDER_ROLE`].
    pub role: String,
    /// The rider's identity.
    pub id: RiderId,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Capture time of the reported position.
    pub last_updated_at: DateTime<Utc>,
}

impl PresencePayload {
    /// Build a presence payload for `rider` at `position`.
    pub fn new(socket_id: SocketId, rider: RiderId, position: &SelfPosition) -> Self {
        Self {
            socket_id,
            role: RIDER_ROLE.to_owned(),
            id: rider,
            lat: position.latitude,
            lng: position.longitude,
            last_updated_at: position.captured_at,
        }
    }
}

/// Payload of [`SUBSCRIBE_TO_DRIVER`] and [`UNSUBSCRIBE_FROM_DRIVER`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverTarget {
    /// Driver to (un)track.
    pub driver_id: DriverId,
}

/// Acknowledgment returned by the server for acked events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Whether the server accepted the request.
    pub success: bool,
    /// Optional server explanation, usually present on rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Ack {
    /// Decode an ack payload.
    pub fn from_value(operation: &'static str, value: Value) -> Result<Self, ClientError> {
        serde_json::from_value(value).map_err(|e| ClientError::Protocol {
            operation,
            message: format!("malformed ack: {e}"),
        })
    }

    /// Turn a decoded ack into a result, mapping `success: false` to
    /// [`ClientError::Rejected`].
    pub fn into_result(self, operation: &'static str) -> Result<(), ClientError> {
        if self.success {
            Ok(())
        } else {
            Err(ClientError::Rejected {
                operation,
                message: self.message,
            })
        }
    }
}
