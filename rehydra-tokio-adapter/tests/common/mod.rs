//! Shared fixtures for the integration tests: mock backends and a minimal store.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rehydra_core::{
    Action, Deferred, Dispatch, MemoryStorage, RawStorage, Reducer, StorageResult,
};
use tokio::time::Instant;

/// One raw `set_item` call as seen by a backend.
#[derive(Debug, Clone)]
pub struct SetCall {
    pub key: String,
    pub raw: String,
    pub at: Instant,
}

/// Synchronous backend recording every raw write and removal.
#[derive(Debug, Default)]
pub struct MockStorage {
    pub inner: MemoryStorage,
    sets: Mutex<Vec<SetCall>>,
    removes: AtomicUsize,
}

impl MockStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stores `raw` under `key` without going through the call log.
    pub fn seed(&self, key: &str, raw: &str) {
        let _ = self.inner.set_item(key, raw.to_string());
    }

    pub fn sets(&self) -> Vec<SetCall> {
        self.sets.lock().unwrap().clone()
    }

    pub fn sets_for(&self, key: &str) -> Vec<SetCall> {
        self.sets().into_iter().filter(|call| call.key == key).collect()
    }

    pub fn remove_calls(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

impl RawStorage for MockStorage {
    fn get_item(&self, key: &str) -> Deferred<StorageResult<Option<String>>> {
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: String) -> Deferred<StorageResult<()>> {
        self.sets.lock().unwrap().push(SetCall {
            key: key.to_string(),
            raw: value.clone(),
            at: Instant::now(),
        });
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Deferred<StorageResult<()>> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove_item(key)
    }
}

/// Asynchronous backend answering every operation after `delay`.
#[derive(Debug)]
pub struct DelayedStorage {
    pub inner: Arc<MemoryStorage>,
    delay: Duration,
}

impl DelayedStorage {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MemoryStorage::new()),
            delay,
        })
    }

    pub fn seed(&self, key: &str, raw: &str) {
        let _ = self.inner.set_item(key, raw.to_string());
    }
}

impl RawStorage for DelayedStorage {
    fn get_item(&self, key: &str) -> Deferred<StorageResult<Option<String>>> {
        let inner = self.inner.clone();
        let key = key.to_string();
        let delay = self.delay;
        Deferred::pending(async move {
            tokio::time::sleep(delay).await;
            inner.get_item(&key).resolve().await
        })
    }

    fn set_item(&self, key: &str, value: String) -> Deferred<StorageResult<()>> {
        let inner = self.inner.clone();
        let key = key.to_string();
        let delay = self.delay;
        Deferred::pending(async move {
            tokio::time::sleep(delay).await;
            inner.set_item(&key, value).resolve().await
        })
    }

    fn remove_item(&self, key: &str) -> Deferred<StorageResult<()>> {
        let inner = self.inner.clone();
        let key = key.to_string();
        let delay = self.delay;
        Deferred::pending(async move {
            tokio::time::sleep(delay).await;
            inner.remove_item(&key).resolve().await
        })
    }
}

/// Smallest store that satisfies [`Dispatch`]: one root reducer and its state.
pub struct TestStore<S, F> {
    reducer: F,
    state: Mutex<Option<Arc<S>>>,
    dispatched: Mutex<Vec<Action>>,
}

impl<S, F> TestStore<S, F>
where
    S: Send + Sync + 'static,
    F: Reducer<S>,
{
    /// Creates the store and runs its `@@INIT` action.
    pub fn new(reducer: F) -> Arc<Self> {
        let store = Arc::new(Self {
            reducer,
            state: Mutex::new(None),
            dispatched: Mutex::new(Vec::new()),
        });
        store.dispatch(Action::new("@@INIT"));
        store
    }

    pub fn state(&self) -> Arc<S> {
        self.state
            .lock()
            .unwrap()
            .clone()
            .expect("store is initialized in new()")
    }

    /// Every action dispatched so far, `@@INIT` included.
    pub fn dispatched(&self) -> Vec<Action> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn restore_count(&self) -> usize {
        self.dispatched().iter().filter(|a| a.is_restore()).count()
    }
}

impl<S, F> Dispatch for TestStore<S, F>
where
    S: Send + Sync + 'static,
    F: Reducer<S>,
{
    fn dispatch(&self, action: Action) {
        let mut state = self.state.lock().unwrap();
        let next = self.reducer.reduce(state.take(), &action);
        *state = Some(next);
        drop(state);
        self.dispatched.lock().unwrap().push(action);
    }
}

pub fn increment() -> Action {
    Action::new("INCREMENT")
}

/// Counter slice: `INCREMENT` adds one, anything else keeps the state.
pub fn counter(state: Option<Arc<i64>>, action: &Action) -> Arc<i64> {
    let current = state.unwrap_or_else(|| Arc::new(0));
    match action.kind.as_str() {
        "INCREMENT" => Arc::new(*current + 1),
        _ => current,
    }
}

/// Label slice: `RENAME` takes the payload string.
pub fn label(state: Option<Arc<String>>, action: &Action) -> Arc<String> {
    match (action.kind.as_str(), action.payload.as_str()) {
        ("RENAME", Some(name)) => Arc::new(name.to_string()),
        _ => state.unwrap_or_else(|| Arc::new(String::new())),
    }
}
