//! Raw storage backend contract.
//!
//! Defines the [`RawStorage`] trait that concrete backends (in-memory, files,
//! browser storage, remote services, …) must fulfill, an in-process
//! [`MemoryStorage`], and the process-wide [`DefaultStorage`] slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::deferred::Deferred;
use crate::error::StorageResult;

/// Pluggable string key/value backend.
///
/// Each operation may complete synchronously ([`Deferred::Ready`]) or
/// asynchronously ([`Deferred::Pending`]). Pending futures must own whatever
/// they need (`'static`), so async backends typically clone an inner `Arc`.
///
/// Backends are shared as `Arc<dyn RawStorage>`; two handles to the same
/// allocation are the same backend.
pub trait RawStorage: Send + Sync + 'static {
    /// Returns the stored string, or `None` when the key is missing.
    fn get_item(&self, key: &str) -> Deferred<StorageResult<Option<String>>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: String) -> Deferred<StorageResult<()>>;

    /// Deletes `key`. Deleting a missing key is not an error.
    fn remove_item(&self, key: &str) -> Deferred<StorageResult<()>>;
}

/// Synchronous in-process backend. Every operation is `Ready`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads a raw slot without going through the `Deferred` contract.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl RawStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Deferred<StorageResult<Option<String>>> {
        Deferred::Ready(Ok(self.raw(key)))
    }

    fn set_item(&self, key: &str, value: String) -> Deferred<StorageResult<()>> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Deferred::Ready(Ok(()))
    }

    fn remove_item(&self, key: &str) -> Deferred<StorageResult<()>> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Deferred::Ready(Ok(()))
    }
}

static DEFAULT_STORAGE: RwLock<Option<Arc<dyn RawStorage>>> = RwLock::new(None);

/// Process-wide default backend.
///
/// Used when a reducer is persisted without an explicit backend and the
/// persistor itself was built without `.default_storage()`.
pub struct DefaultStorage;

impl DefaultStorage {
    /// Installs `storage` as the default, replacing any previous one.
    pub fn set(storage: Arc<dyn RawStorage>) {
        *DEFAULT_STORAGE
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(storage);
    }

    pub fn get() -> Option<Arc<dyn RawStorage>> {
        DEFAULT_STORAGE
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes the installed default, returning it.
    pub fn clear() -> Option<Arc<dyn RawStorage>> {
        DEFAULT_STORAGE
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready<T: core::fmt::Debug>(d: Deferred<T>) -> T {
        d.into_ready().expect("memory storage answers synchronously")
    }

    #[test]
    fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert_eq!(ready(storage.get_item("count")), Ok(None));

        ready(storage.set_item("count", "[1,0]".to_string())).unwrap();
        assert_eq!(ready(storage.get_item("count")), Ok(Some("[1,0]".to_string())));
        assert_eq!(storage.len(), 1);

        ready(storage.remove_item("count")).unwrap();
        assert!(storage.is_empty());
        // Removing twice is fine
        ready(storage.remove_item("count")).unwrap();
    }

    #[test]
    fn test_default_storage_slot() {
        let storage: Arc<dyn RawStorage> = Arc::new(MemoryStorage::new());
        DefaultStorage::set(storage.clone());
        let installed = DefaultStorage::get().expect("default installed");
        assert!(Arc::ptr_eq(&installed, &storage));

        let cleared = DefaultStorage::clear();
        assert!(cleared.is_some());
        assert!(DefaultStorage::get().is_none());
    }
}
