//! Ephemeral object references for in-memory image data.
//!
//! Every URL handed out stays resolvable until it is revoked. Records own
//! their URLs, so whoever removes a record revokes them; anything still live
//! when the registry is dropped is revoked then.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const URL_PREFIX: &str = "blob:cutout/";

#[derive(Debug, Default)]
pub struct ObjectUrlRegistry {
    objects: Mutex<HashMap<String, Arc<Vec<u8>>>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, Arc<Vec<u8>>>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `data` and return a fresh URL for it.
    pub fn create(&self, data: Vec<u8>) -> String {
        let url = format!("{}{}", URL_PREFIX, Uuid::new_v4());
        self.objects().insert(url.clone(), Arc::new(data));
        url
    }

    pub fn resolve(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.objects().get(url).cloned()
    }

    /// Release one URL. Returns false if it was unknown or already revoked.
    pub fn revoke(&self, url: &str) -> bool {
        self.objects().remove(url).is_some()
    }

    /// Release every live URL, returning how many were revoked.
    pub fn revoke_all(&self) -> usize {
        let mut objects = self.objects();
        let count = objects.len();
        objects.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }
}

impl Drop for ObjectUrlRegistry {
    fn drop(&mut self) {
        let revoked = self.revoke_all();
        if revoked > 0 {
            tracing::debug!(revoked, "Revoked object URLs on teardown");
        }
    }
}
