//! Fan-out of driver positions to UI observers.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use rideline_core::RemotePositionEvent;
use tracing::{trace, warn};

/// Observer of driver positions. Implemented for plain closures.
pub trait PositionListener: Send + Sync {
    /// Called once per dispatched event, on the transport's task.
    fn on_position(&self, event: &RemotePositionEvent);
}

impl<F> PositionListener for F
where
    F: Fn(&RemotePositionEvent) + Send + Sync,
{
    fn on_position(&self, event: &RemotePositionEvent) {
        self(event);
    }
}

struct Entry {
    listener: Arc<dyn PositionListener>,
    active: Arc<AtomicBool>,
}

/// Set of listeners keyed by `Arc` identity.
///
/// A dispatch holds a reentrant lock for its whole fan-out, so
/// [`remove_listener`](Self::remove_listener) from another thread waits for
/// the in-flight dispatch to finish, while a listener removing itself (or
/// another listener) from inside a callback re-enters and takes effect for
/// the rest of that dispatch.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<Vec<Entry>>,
    dispatching: ReentrantMutex<()>,
    last_event: Mutex<Option<RemotePositionEvent>>,
}

impl ListenerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`. `false` if it was already registered.
    pub fn add_listener(&self, listener: Arc<dyn PositionListener>) -> bool {
        let mut entries = self.entries.lock();
        if entries.iter().any(|e| Arc::ptr_eq(&e.listener, &listener)) {
            return false;
        }
        entries.push(Entry {
            listener,
            active: Arc::new(AtomicBool::new(true)),
        });
        true
    }

    /// Unregister `listener`. Once this returns the listener is never
    /// invoked again.
    pub fn remove_listener(&self, listener: &Arc<dyn PositionListener>) -> bool {
        let _dispatch = self.dispatching.lock();
        let mut entries = self.entries.lock();
        let Some(index) = entries.iter().position(|e| Arc::ptr_eq(&e.listener, listener)) else {
            return false;
        };
        let entry = entries.remove(index);
        entry.active.store(false, Ordering::Release);
        true
    }

    /// Deliver `event` to every registered listener. A panicking listener
    /// is logged and skipped. Returns how many listeners completed.
    pub fn dispatch(&self, event: &RemotePositionEvent) -> usize {
        *self.last_event.lock() = Some(*event);

        let _dispatch = self.dispatching.lock();
        let snapshot: Vec<(Arc<dyn PositionListener>, Arc<AtomicBool>)> = self
            .entries
            .lock()
            .iter()
            .map(|e| (Arc::clone(&e.listener), Arc::clone(&e.active)))
            .collect();

        let mut delivered = 0;
        for (listener, active) in snapshot {
            if !active.load(Ordering::Acquire) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| listener.on_position(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    let reason = payload
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_owned())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".into());
                    warn!(%reason, "position listener panicked");
                }
            }
        }
        trace!(delivered, "dispatched driver position");
        delivered
    }

    /// Most recently dispatched event.
    pub fn last_event(&self) -> Option<RemotePositionEvent> {
        *self.last_event.lock()
    }

    /// Forget the most recent event.
    pub fn clear_last_event(&self) {
        *self.last_event.lock() = None;
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove every listener.
    pub fn clear(&self) {
        let _dispatch = self.dispatching.lock();
        for entry in self.entries.lock().drain(..) {
            entry.active.store(false, Ordering::Release);
        }
    }
}
