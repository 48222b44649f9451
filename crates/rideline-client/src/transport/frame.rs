use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One JSON text frame on the socket.
///
/// Outbound events carry `event`, optionally `ack` when a reply is wanted.
/// Ack replies carry only `ack` and `data`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name, absent on ack replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Payload.
    #[serde(default)]
    pub data: Value,
    /// Correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

/// Classified inbound frame.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    /// Server-pushed event.
    Event {
        /// Event name.
        event: String,
        /// Payload.
        data: Value,
    },
    /// Reply to one of our requests.
    Ack {
        /// Correlation id of the request.
        id: u64,
        /// Ack payload.
        data: Value,
    },
}

impl Frame {
    /// Fire-and-forget event.
    pub fn event(event: &str, data: Value) -> Self {
        Self {
            event: Some(event.to_owned()),
            data,
            ack: None,
        }
    }

    /// Event expecting an ack with correlation id `ack`.
    pub fn request(event: &str, data: Value, ack: u64) -> Self {
        Self {
            ack: Some(ack),
            ..Self::event(event, data)
        }
    }

    /// Decode one inbound text frame. `None` for frames that are neither
    /// an event nor an ack.
    pub fn parse_inbound(text: &str) -> Result<Option<Inbound>, serde_json::Error> {
        let frame: Self = serde_json::from_str(text)?;
        Ok(match (frame.event, frame.ack) {
            (Some(event), _) => Some(Inbound::Event {
                event,
                data: frame.data,
            }),
            (None, Some(id)) => Some(Inbound::Ack {
                id,
                data: frame.data,
            }),
            (None, None) => None,
        })
    }
}
