//! Shared fixtures for unit tests.

use core::future::Future;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;

use rehydra_executor::{ExecutorResult, RuntimeAdapter, Spawn, TimeOps};

use crate::deferred::Deferred;
use crate::error::StorageResult;
use crate::storage::{MemoryStorage, RawStorage};

/// Minimal tokio-backed runtime for tests inside this crate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TestRuntime;

impl RuntimeAdapter for TestRuntime {
    fn runtime_name() -> &'static str {
        "test"
    }
}

impl TimeOps for TestRuntime {
    type Instant = tokio::time::Instant;
    type Duration = Duration;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn duration_since(&self, later: Self::Instant, earlier: Self::Instant) -> Option<Duration> {
        later.checked_duration_since(earlier)
    }

    fn millis(&self, ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn secs(&self, secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

impl Spawn for TestRuntime {
    type SpawnToken = ();

    fn spawn<F>(&self, future: F) -> ExecutorResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(future);
        Ok(())
    }
}

/// Synchronous backend that counts raw writes and removals.
#[derive(Debug, Default)]
pub(crate) struct CountingStorage {
    pub inner: MemoryStorage,
    sets: AtomicUsize,
    removes: AtomicUsize,
}

impl CountingStorage {
    pub fn seed(&self, key: &str, raw: &str) {
        let _ = self.inner.set_item(key, raw.to_string());
    }

    pub fn set_calls(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn remove_calls(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

impl RawStorage for CountingStorage {
    fn get_item(&self, key: &str) -> Deferred<StorageResult<Option<String>>> {
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: String) -> Deferred<StorageResult<()>> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Deferred<StorageResult<()>> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove_item(key)
    }
}
