//! Process-wide record of the one live transport.
//!
//! Each manager claims the slot when its transport connects. Whatever was
//! there before and is still alive is handed back so the claimer can close
//! it: at most one socket per process reports the rider's presence.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::transport::Transport;

/// Holder of the process's live transport. Share one instance between all
/// clients of a process.
#[derive(Default)]
pub struct TransportSlot {
    current: Mutex<Option<Weak<dyn Transport>>>,
}

impl TransportSlot {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `transport` as the live one. Returns the previous occupant if
    /// it is a different transport that is still alive.
    pub fn claim(&self, transport: &Arc<dyn Transport>) -> Option<Arc<dyn Transport>> {
        let previous = self.current.lock().replace(Arc::downgrade(transport));
        previous
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(|prev| !Arc::ptr_eq(prev, transport))
    }

    /// Vacate the slot if `transport` occupies it.
    pub fn release(&self, transport: &Arc<dyn Transport>) -> bool {
        let mut current = self.current.lock();
        let occupied_by_us = current
            .as_ref()
            .is_some_and(|weak| weak.ptr_eq(&Arc::downgrade(transport)));
        if occupied_by_us {
            *current = None;
        }
        occupied_by_us
    }

    /// Current occupant, if still alive.
    pub fn current(&self) -> Option<Arc<dyn Transport>> {
        self.current.lock().as_ref().and_then(Weak::upgrade)
    }
}
