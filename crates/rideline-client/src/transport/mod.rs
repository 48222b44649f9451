//! Persistent bidirectional event channel to the location server.
//!
//! A [`Connector`] opens a [`TransportLink`]: the [`Transport`] handle used
//! for outbound traffic plus the stream of [`TransportEvent`]s the transport
//! produces on its own task. Reconnect with fixed backoff happens inside
//! the transport; consumers only observe the events.

mod frame;
pub mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rideline_core::{SocketId, TransportError};
use serde_json::Value;
use tokio::sync::mpsc;

pub use frame::{Frame, Inbound};
pub use websocket::WsConnector;

/// Outbound half of a transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Id of the current physical connection, `None` while down.
    fn socket_id(&self) -> Option<SocketId>;

    /// Whether a physical connection is up right now.
    fn is_connected(&self) -> bool;

    /// Send `event` without waiting for an ack.
    fn emit(&self, event: &str, data: Value) -> Result<(), TransportError>;

    /// Send `event` and wait for the server's ack payload.
    async fn request(&self, event: &str, data: Value) -> Result<Value, TransportError>;

    /// Close for good. Pending requests fail and no reconnect follows.
    async fn close(&self);
}

/// Lifecycle and inbound traffic observed by a transport.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// First physical connection is up.
    Connected,
    /// The physical connection dropped. A reconnect attempt follows.
    Disconnected {
        /// Why the socket went away.
        reason: String,
    },
    /// A dial attempt failed.
    ConnectError {
        /// Dial failure description.
        message: String,
    },
    /// A physical connection came back after a drop.
    Reconnected {
        /// Dial attempts it took since the drop.
        attempt: u32,
    },
    /// The reconnect budget is spent. The transport is dead.
    ReconnectFailed,
    /// Server-pushed event.
    Message {
        /// Event name.
        event: String,
        /// Event payload.
        data: Value,
    },
}

/// An opened transport and its event stream.
pub struct TransportLink {
    /// Outbound handle.
    pub transport: Arc<dyn Transport>,
    /// Events in the order the transport observed them.
    pub events: mpsc::Receiver<TransportEvent>,
}

impl std::fmt::Debug for TransportLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportLink").finish_non_exhaustive()
    }
}

/// Factory for transports.
pub trait Connector: Send + Sync {
    /// Open a transport and start dialing. Must be called inside a Tokio
    /// runtime.
    fn open(&self) -> Result<TransportLink, TransportError>;
}

/// The transport the client currently works through, shared between the
/// connection manager and the subscription controller.
#[derive(Default)]
pub struct ActiveTransport {
    current: RwLock<Option<Arc<dyn Transport>>>,
}

impl ActiveTransport {
    /// Empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `transport` as current.
    pub fn set(&self, transport: Arc<dyn Transport>) {
        *self.current.write() = Some(transport);
    }

    /// Clear the cell if it still holds `transport`.
    pub fn clear_if(&self, transport: &Arc<dyn Transport>) {
        let mut current = self.current.write();
        if current.as_ref().is_some_and(|t| Arc::ptr_eq(t, transport)) {
            *current = None;
        }
    }

    /// Current transport if its physical connection is up.
    pub fn live(&self) -> Option<Arc<dyn Transport>> {
        self.current
            .read()
            .as_ref()
            .filter(|t| t.is_connected())
            .cloned()
    }
}
