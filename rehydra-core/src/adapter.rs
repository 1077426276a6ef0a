//! Storage adapter: debounced writes and expiring reads over one backend.
//!
//! Writes never reach the backend synchronously. They land in a per-adapter
//! pending buffer (last value per key wins) and a single coalescing timer
//! flushes the whole buffer once the window elapses. Reads go straight to the
//! backend and do not consult the buffer, so a read right after a write may
//! still observe the previously flushed value.

use core::fmt;
use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use rehydra_executor::{Runtime, Spawn};
use serde_json::Value;

use crate::deferred::Deferred;
use crate::error::StorageResult;
use crate::record::PersistedRecord;
use crate::storage::RawStorage;
use crate::time::Clock;

/// Sink for serialized state slices.
///
/// Persisted reducers only need to enqueue writes, so they hold the adapter
/// through this trait and stay independent of the runtime type.
pub trait WriteBack: Send + Sync {
    fn enqueue(&self, key: &str, value: Value);
}

#[derive(Default)]
struct WriteBuffer {
    pending: HashMap<String, Value>,
    flush_scheduled: bool,
}

/// Wraps one [`RawStorage`] with write coalescing and per-key expiration.
pub struct StorageAdapter<R: Runtime> {
    storage: Arc<dyn RawStorage>,
    runtime: Arc<R>,
    clock: Arc<dyn Clock>,
    flush_window: Duration,
    buffer: Arc<Mutex<WriteBuffer>>,
}

impl<R: Runtime> StorageAdapter<R> {
    pub fn new(
        storage: Arc<dyn RawStorage>,
        runtime: Arc<R>,
        clock: Arc<dyn Clock>,
        flush_window: Duration,
    ) -> Self {
        Self {
            storage,
            runtime,
            clock,
            flush_window,
            buffer: Arc::new(Mutex::new(WriteBuffer::default())),
        }
    }

    pub fn storage(&self) -> &Arc<dyn RawStorage> {
        &self.storage
    }

    pub fn flush_window(&self) -> Duration {
        self.flush_window
    }

    /// Number of keys waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        lock(&self.buffer).pending.len()
    }

    pub fn is_flush_scheduled(&self) -> bool {
        lock(&self.buffer).flush_scheduled
    }

    /// Reads and decodes the record stored under `key`.
    ///
    /// Resolves to `None` when the key is missing, the backend read fails, the
    /// slot does not decode, or the record is older than `expiration`. Corrupt
    /// and expired slots are removed from the backend without waiting for the
    /// removal to finish. A stored JSON `null` resolves to `Some(Value::Null)`.
    pub fn read(&self, key: &str, expiration: Option<Duration>) -> Deferred<Option<Value>> {
        let storage = self.storage.clone();
        let runtime = self.runtime.clone();
        let clock = self.clock.clone();
        let key_owned = key.to_string();

        self.storage.get_item(key).map(move |slot| {
            interpret_slot(&*storage, &*runtime, &*clock, &key_owned, expiration, slot)
        })
    }

    /// Buffers `value` for `key` and arms the flush timer if it is idle.
    pub fn write(&self, key: &str, value: Value) {
        let arm_timer = {
            let mut buffer = lock(&self.buffer);
            buffer.pending.insert(key.to_string(), value);
            !core::mem::replace(&mut buffer.flush_scheduled, true)
        };

        if arm_timer {
            self.schedule_flush();
        }
    }

    /// Deletes `key` from the backend directly, bypassing the buffer.
    pub fn remove(&self, key: &str) -> Deferred<StorageResult<()>> {
        self.storage.remove_item(key)
    }

    /// Writes everything currently buffered without waiting for the timer.
    ///
    /// An armed timer still fires afterwards and finds an empty buffer.
    pub async fn flush(&self) {
        let batch = core::mem::take(&mut lock(&self.buffer).pending);
        write_batch(&*self.storage, &*self.clock, batch).await;
    }

    fn schedule_flush(&self) {
        let runtime = self.runtime.clone();
        let storage = self.storage.clone();
        let clock = self.clock.clone();
        let buffer = self.buffer.clone();
        let window_ms = u64::try_from(self.flush_window.as_millis()).unwrap_or(u64::MAX);

        let flush = async move {
            runtime.sleep(runtime.millis(window_ms)).await;
            let batch = {
                let mut buffer = lock(&buffer);
                buffer.flush_scheduled = false;
                core::mem::take(&mut buffer.pending)
            };
            write_batch(&*storage, &*clock, batch).await;
        };

        if let Err(_e) = self.runtime.spawn(flush) {
            // Leave the buffer intact; the next write re-arms the timer.
            lock(&self.buffer).flush_scheduled = false;
            #[cfg(feature = "tracing")]
            tracing::error!("Persistence: failed to schedule flush: {}", _e);
        }
    }
}

impl<R: Runtime> WriteBack for StorageAdapter<R> {
    fn enqueue(&self, key: &str, value: Value) {
        self.write(key, value);
    }
}

impl<R: Runtime> fmt::Debug for StorageAdapter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffer = lock(&self.buffer);
        f.debug_struct("StorageAdapter")
            .field("flush_window", &self.flush_window)
            .field("pending", &buffer.pending.len())
            .field("flush_scheduled", &buffer.flush_scheduled)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn interpret_slot<R: Spawn>(
    storage: &dyn RawStorage,
    runtime: &R,
    clock: &dyn Clock,
    key: &str,
    expiration: Option<Duration>,
    slot: StorageResult<Option<String>>,
) -> Option<Value> {
    let raw = match slot {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Persistence: reading '{}' failed: {}", key, _e);
            return None;
        }
    };

    match PersistedRecord::decode(&raw) {
        Ok(record) if record.is_expired(expiration, clock.now_millis()) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Persistence: '{}' expired, purging", key);
            purge(storage, runtime, key);
            None
        }
        Ok(record) => Some(record.value),
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Persistence: '{}' holds a corrupt record, purging: {}", key, _e);
            purge(storage, runtime, key);
            None
        }
    }
}

/// Fire-and-forget removal of a stale slot.
fn purge<R: Spawn>(storage: &dyn RawStorage, runtime: &R, key: &str) {
    match storage.remove_item(key) {
        Deferred::Ready(result) => report_purge(key, result),
        Deferred::Pending(removal) => {
            let key = key.to_string();
            let spawned = runtime.spawn(async move {
                let result = removal.await;
                report_purge(&key, result);
            });
            if let Err(_e) = spawned {
                #[cfg(feature = "tracing")]
                tracing::error!("Persistence: failed to spawn purge: {}", _e);
            }
        }
    }
}

fn report_purge(_key: &str, _result: StorageResult<()>) {
    #[cfg(feature = "tracing")]
    {
        if let Err(e) = _result {
            tracing::warn!("Persistence: failed to purge '{}': {}", _key, e);
        }
    }
}

async fn write_batch(storage: &dyn RawStorage, clock: &dyn Clock, batch: HashMap<String, Value>) {
    if batch.is_empty() {
        return;
    }

    let written_at = clock.now_millis();
    let mut in_flight = Vec::new();

    #[cfg(feature = "tracing")]
    tracing::debug!("Persistence: flushing {} key(s)", batch.len());

    for (key, value) in batch {
        let encoded = match PersistedRecord::new(value, written_at).encode() {
            Ok(encoded) => encoded,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Persistence: failed to encode '{}': {}", key, _e);
                continue;
            }
        };

        match storage.set_item(&key, encoded) {
            Deferred::Ready(result) => report_write(&key, result),
            Deferred::Pending(write) => in_flight.push(async move { (key, write.await) }),
        }
    }

    for (key, result) in join_all(in_flight).await {
        report_write(&key, result);
    }
}

fn report_write(_key: &str, _result: StorageResult<()>) {
    #[cfg(feature = "tracing")]
    {
        if let Err(e) = _result {
            tracing::warn!("Persistence: failed to store '{}': {}", _key, e);
        }
    }
}
