//! Hand-off point for inbound `message` envelopes.
//!
//! Their content belongs to the notification layer; the client only routes.

use serde_json::Value;
use tracing::debug;

/// Receives server-defined `message` envelopes.
pub trait MessageRouter: Send + Sync {
    /// Route one envelope. Must not block.
    fn route(&self, envelope: Value);
}

/// Router that only logs envelopes.
#[derive(Debug, Default)]
pub struct LogRouter;

impl MessageRouter for LogRouter {
    fn route(&self, envelope: Value) {
        debug!(%envelope, "inbound message envelope");
    }
}
