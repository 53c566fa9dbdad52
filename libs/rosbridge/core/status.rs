//! Connection status fan-out
//!
//! Observers are keyed by handle id and notified in registration order on
//! every transition. The current state is mirrored into a shared
//! [`AtomicConnectionState`] for lock-free reads from the façade.

use crate::core::connection_state::{AtomicConnectionState, ConnectionState};
use crate::traits::StatusObserver;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Identifies one status observer
pub type ObserverId = u64;

pub struct StatusFanout {
    state: Arc<AtomicConnectionState>,
    observers: BTreeMap<ObserverId, Box<dyn StatusObserver>>,
}

impl StatusFanout {
    pub fn new(state: Arc<AtomicConnectionState>) -> Self {
        Self {
            state,
            observers: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn current(&self) -> ConnectionState {
        self.state.get()
    }

    /// Register an observer and hand it the current state right away
    pub fn observe(&mut self, id: ObserverId, mut observer: Box<dyn StatusObserver>) {
        let current = self.current();
        notify(id, observer.as_mut(), current);
        self.observers.insert(id, observer);
    }

    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    /// Move to `next`, notifying observers; returns `false` (and notifies
    /// nobody) when `next` is already current.
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        let previous = self.state.swap(next);
        if previous == next {
            return false;
        }

        debug!(from = %previous, to = %next, "Connection state changed");
        for (id, observer) in self.observers.iter_mut() {
            notify(*id, observer.as_mut(), next);
        }
        true
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

fn notify(id: ObserverId, observer: &mut dyn StatusObserver, status: ConnectionState) {
    if catch_unwind(AssertUnwindSafe(|| observer.on_status(status))).is_err() {
        warn!(observer = id, %status, "Status observer panicked");
    }
}
