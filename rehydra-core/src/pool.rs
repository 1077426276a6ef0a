//! Adapter pool: one [`StorageAdapter`] per backend instance.
//!
//! Backends are identified by the address of their `Arc` allocation, never by
//! value. The pool holds adapters weakly: an adapter lives exactly as long as
//! something else (a registry entry, a persisted reducer) holds it, and the
//! adapter in turn keeps its backend alive. A dead entry therefore means the
//! adapter is gone and the slot is free to reuse, even if the allocator hands
//! the same address to a new backend.

use core::fmt;
use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use rehydra_executor::Runtime;

use crate::adapter::StorageAdapter;
use crate::storage::RawStorage;
use crate::time::Clock;

/// Identity-keyed, weakly-held cache of storage adapters.
///
/// Each [`Persistor`](crate::Persistor) owns one pool, so "one adapter per
/// backend" holds within a persistor. Two persistors sharing a backend each
/// get their own adapter, with separate buffers and flush timers.
pub struct AdapterPool<R: Runtime> {
    runtime: Arc<R>,
    clock: Arc<dyn Clock>,
    flush_window: Duration,
    adapters: Mutex<HashMap<usize, Weak<StorageAdapter<R>>>>,
}

impl<R: Runtime> AdapterPool<R> {
    pub fn new(runtime: Arc<R>, clock: Arc<dyn Clock>, flush_window: Duration) -> Self {
        Self {
            runtime,
            clock,
            flush_window,
            adapters: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the adapter for this exact backend instance, creating it on first use.
    pub fn adapter_for(&self, storage: &Arc<dyn RawStorage>) -> Arc<StorageAdapter<R>> {
        let id = identity(storage);
        let mut adapters = self
            .adapters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(adapter) = adapters.get(&id).and_then(Weak::upgrade) {
            return adapter;
        }

        adapters.retain(|_, adapter| adapter.strong_count() > 0);

        let adapter = Arc::new(StorageAdapter::new(
            storage.clone(),
            self.runtime.clone(),
            self.clock.clone(),
            self.flush_window,
        ));
        adapters.insert(id, Arc::downgrade(&adapter));

        #[cfg(feature = "tracing")]
        tracing::debug!("Persistence: created storage adapter #{}", adapters.len());

        adapter
    }

    /// Number of adapters still alive.
    pub fn live_adapters(&self) -> usize {
        self.adapters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|adapter| adapter.strong_count() > 0)
            .count()
    }
}

impl<R: Runtime> fmt::Debug for AdapterPool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterPool")
            .field("flush_window", &self.flush_window)
            .field("live_adapters", &self.live_adapters())
            .finish_non_exhaustive()
    }
}

fn identity(storage: &Arc<dyn RawStorage>) -> usize {
    Arc::as_ptr(storage) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::test_util::TestRuntime;
    use crate::time::SystemClock;

    fn pool() -> AdapterPool<TestRuntime> {
        AdapterPool::new(
            Arc::new(TestRuntime),
            Arc::new(SystemClock),
            Duration::from_millis(100),
        )
    }

    #[test]
    fn test_same_backend_same_adapter() {
        let pool = pool();
        let storage: Arc<dyn RawStorage> = Arc::new(MemoryStorage::new());

        let first = pool.adapter_for(&storage);
        let second = pool.adapter_for(&storage.clone());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.live_adapters(), 1);
    }

    #[test]
    fn test_equal_backends_get_distinct_adapters() {
        let pool = pool();
        let a: Arc<dyn RawStorage> = Arc::new(MemoryStorage::new());
        let b: Arc<dyn RawStorage> = Arc::new(MemoryStorage::new());

        let first = pool.adapter_for(&a);
        let second = pool.adapter_for(&b);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(pool.live_adapters(), 2);
    }

    #[test]
    fn test_pool_does_not_retain_adapters() {
        let pool = pool();
        let storage: Arc<dyn RawStorage> = Arc::new(MemoryStorage::new());
        let weak_storage = Arc::downgrade(&storage);

        let adapter = pool.adapter_for(&storage);
        drop(storage);
        assert!(weak_storage.upgrade().is_some(), "adapter keeps its backend");

        drop(adapter);
        assert_eq!(pool.live_adapters(), 0);
        assert!(weak_storage.upgrade().is_none(), "pool keeps nothing alive");
    }
}
