//! Error hierarchy for the rideline client.
//!
//! - [`ClientError`]: what callers of `connect`, `subscribe_to` and
//!   `unsubscribe` see
//! - [`TransportError`]: failures of the persistent connection itself
//! - [`LocationError`]: device location provider failures
//! - [`StoreError`]: key-value persistence failures (never surfaced past the cache)
//!
//! Every [`ClientError`] maps to one [`ErrorKind`] so the UI can decide
//! between a soft "searching" state and an actionable message.

use std::fmt;

use thiserror::Error;

/// Coarse classification of a [`ClientError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Location access denied. The only fatal kind.
    Permission,
    /// Connectivity loss or transport failure.
    Transport,
    /// The server answered `success: false`.
    Rejected,
    /// The server answered something we could not decode.
    Protocol,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Permission => "permission",
            Self::Transport => "transport",
            Self::Rejected => "rejected",
            Self::Protocol => "protocol",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the streaming client to its caller.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The user denied location access.
    #[error("location permission denied")]
    PermissionDenied,

    /// The device could not produce a position for another reason.
    #[error("location unavailable: {message}")]
    Location {
        /// Provider explanation.
        message: String,
    },

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server rejected a request.
    #[error("{operation} rejected by server{}", reason_suffix(.message))]
    Rejected {
        /// Event name of the rejected request.
        operation: &'static str,
        /// Server explanation, if any.
        message: Option<String>,
    },

    /// The server reply could not be decoded.
    #[error("protocol error in {operation}: {message}")]
    Protocol {
        /// Event name of the request.
        operation: &'static str,
        /// What was wrong with the reply.
        message: String,
    },

    /// The session was torn down before the connection was established.
    #[error("connection closed before it was established")]
    Disconnected,
}

fn reason_suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl ClientError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied => ErrorKind::Permission,
            Self::Location { .. } | Self::Transport(_) | Self::Disconnected => ErrorKind::Transport,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::Protocol { .. } => ErrorKind::Protocol,
        }
    }

    /// Whether the UI should show an actionable message instead of a
    /// "searching" indicator.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Permission
    }
}

impl From<LocationError> for ClientError {
    fn from(err: LocationError) -> Self {
        match err {
            LocationError::PermissionDenied => Self::PermissionDenied,
            LocationError::Unavailable(message) => Self::Location { message },
        }
    }
}

/// Failures of the persistent transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No physical connection is currently up.
    #[error("transport not connected")]
    NotConnected,

    /// The transport was closed for good.
    #[error("transport closed")]
    Closed,

    /// No ack arrived in time.
    #[error("timed out after {timeout_ms}ms waiting for ack to {event}")]
    Timeout {
        /// Event that was awaiting an ack.
        event: String,
        /// How long we waited.
        timeout_ms: u64,
    },

    /// Dialing the server failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A frame could not be encoded or decoded.
    #[error("frame serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of the device location provider.
#[derive(Debug, Error)]
pub enum LocationError {
    /// The user denied location access.
    #[error("location permission denied")]
    PermissionDenied,
    /// Any other provider failure.
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// Failures of the key-value store backing the position cache.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Backend-specific failure.
    #[error("store backend failed: {0}")]
    Backend(String),
}
