//! Read-only view of the authentication token store.

use parking_lot::Mutex;
use rideline_core::RiderId;

/// What the client needs from the auth layer: who is logged in, if anyone.
pub trait AuthSession: Send + Sync {
    /// Identity of the logged-in rider.
    fn current_user_id(&self) -> Option<RiderId>;

    /// Whether a user is logged in.
    fn is_logged_in(&self) -> bool {
        self.current_user_id().is_some()
    }
}

/// In-memory [`AuthSession`] for binaries and tests.
#[derive(Debug, Default)]
pub struct StaticAuth {
    user: Mutex<Option<RiderId>>,
}

impl StaticAuth {
    /// Create a session already logged in as `rider`.
    pub fn logged_in(rider: RiderId) -> Self {
        Self {
            user: Mutex::new(Some(rider)),
        }
    }

    /// Log in as `rider`.
    pub fn set(&self, rider: RiderId) {
        *self.user.lock() = Some(rider);
    }

    /// Log out.
    pub fn clear(&self) {
        *self.user.lock() = None;
    }
}

impl AuthSession for StaticAuth {
    fn current_user_id(&self) -> Option<RiderId> {
        self.user.lock().clone()
    }
}
