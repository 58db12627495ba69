//! In-flight request registry
//!
//! Process-wide table of request ids currently being handled. A request must
//! hold an [`InFlightGuard`] for its id; a second request with the same id is
//! refused while the guard is alive. Dropping the guard removes the id, so the
//! entry disappears on every exit path, panics and aborted tasks included.
//!
//! Deduplication is per process only: replicas behind a load balancer do not
//! see each other's entries.

use cutout_core::RequestId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct InFlightRegistry {
    ids: Mutex<HashSet<String>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the set half-updated, so a
    // poisoned lock is still safe to use.
    fn ids(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `id`, or return `None` if it is already in flight.
    pub fn try_acquire(self: &Arc<Self>, id: &RequestId) -> Option<InFlightGuard> {
        let inserted = self.ids().insert(id.as_str().to_string());
        if !inserted {
            return None;
        }
        Some(InFlightGuard {
            registry: Arc::clone(self),
            id: id.clone(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids().contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    /// Forget every entry. Called at shutdown.
    pub fn clear(&self) {
        let mut ids = self.ids();
        if !ids.is_empty() {
            tracing::warn!(count = ids.len(), "Clearing in-flight requests at shutdown");
        }
        ids.clear();
    }

    fn release(&self, id: &str) {
        self.ids().remove(id);
    }
}

/// Proof that a request id is registered; deregisters it on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    id: RequestId,
}

impl InFlightGuard {
    pub fn request_id(&self) -> &RequestId {
        &self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.release(self.id.as_str());
        tracing::debug!(request_id = %self.id, "Request removed from in-flight registry");
    }
}
