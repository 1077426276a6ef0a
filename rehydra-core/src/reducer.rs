//! Reducer interception.
//!
//! A reducer maps `(previous state, action)` to the next state. State slices
//! travel as `Arc<S>` so "the state changed" means "the reducer returned a
//! different allocation", never a deep comparison.
//!
//! [`PersistedReducer`] wraps one reducer: it absorbs its slice from the
//! restore action and enqueues a write whenever an ordinary action produces a
//! new slice. [`ReducerMap`] and [`CombinedReducer`] are the reducer
//! combination contract, with per-key persistence selected by
//! [`PersistMapOptions`].

use core::any::Any;
use core::fmt;
use core::marker::PhantomData;
use core::time::Duration;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::action::{Action, ActionFilter};
use crate::adapter::WriteBack;
use crate::storage::RawStorage;

/// A pure state transition.
pub trait Reducer<S>: Send + Sync + 'static {
    fn reduce(&self, state: Option<Arc<S>>, action: &Action) -> Arc<S>;
}

impl<S, F> Reducer<S> for F
where
    F: Fn(Option<Arc<S>>, &Action) -> Arc<S> + Send + Sync + 'static,
{
    fn reduce(&self, state: Option<Arc<S>>, action: &Action) -> Arc<S> {
        self(state, action)
    }
}

// ============================================================================
// Options
// ============================================================================

/// Options for persisting a single reducer.
#[derive(Clone)]
pub struct PersistOptions {
    /// Persistence key; must be unique across the persistor.
    pub key: String,
    /// Backend; falls back to the persistor default, then [`DefaultStorage`](crate::DefaultStorage).
    pub storage: Option<Arc<dyn RawStorage>>,
    /// TTL; falls back to `PersistorConfig::default_expiration_ms`.
    pub expiration: Option<Duration>,
}

impl PersistOptions {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            storage: None,
            expiration: None,
        }
    }

    pub fn storage(mut self, storage: Arc<dyn RawStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }
}

impl fmt::Debug for PersistOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistOptions")
            .field("key", &self.key)
            .field("storage", &self.storage.is_some())
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Options for persisting a [`ReducerMap`].
///
/// A white list, when present, wins over a black list.
#[derive(Clone, Default)]
pub struct PersistMapOptions {
    pub white_list: Option<Vec<String>>,
    pub black_list: Option<Vec<String>>,
    pub prefix: Option<String>,
    pub storage: Option<Arc<dyn RawStorage>>,
    pub expiration: Option<Duration>,
}

impl PersistMapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn white_list<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.white_list = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn black_list<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.black_list = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn storage(mut self, storage: Arc<dyn RawStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Whether the slice under `key` is persisted.
    pub fn includes(&self, key: &str) -> bool {
        if let Some(white_list) = &self.white_list {
            white_list.iter().any(|k| k == key)
        } else if let Some(black_list) = &self.black_list {
            !black_list.iter().any(|k| k == key)
        } else {
            true
        }
    }

    /// Persistence key for the slice under `key`: `prefix + separator + key`,
    /// or `key` alone without a (non-empty) prefix.
    pub fn storage_key(&self, key: &str, separator: &str) -> String {
        match self.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}{separator}{key}"),
            _ => key.to_string(),
        }
    }
}

impl fmt::Debug for PersistMapOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistMapOptions")
            .field("white_list", &self.white_list)
            .field("black_list", &self.black_list)
            .field("prefix", &self.prefix)
            .field("storage", &self.storage.is_some())
            .field("expiration", &self.expiration)
            .finish()
    }
}

// ============================================================================
// Persisted reducer
// ============================================================================

struct SliceTracker<S> {
    last: Option<Arc<S>>,
    hydrated: bool,
}

/// A reducer whose slice is restored from and written back to storage.
///
/// Writes start only once the reducer has seen a restore action, so the
/// store's initial dispatches never overwrite persisted data.
pub struct PersistedReducer<S, F> {
    inner: F,
    key: String,
    sink: Arc<dyn WriteBack>,
    filter: ActionFilter,
    tracker: Mutex<SliceTracker<S>>,
}

impl<S, F> PersistedReducer<S, F>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Reducer<S>,
{
    pub(crate) fn new(inner: F, key: String, sink: Arc<dyn WriteBack>, filter: ActionFilter) -> Self {
        Self {
            inner,
            key,
            sink,
            filter,
            tracker: Mutex::new(SliceTracker {
                last: None,
                hydrated: false,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether a restore action has been absorbed.
    pub fn is_hydrated(&self) -> bool {
        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .hydrated
    }

    fn absorb_restore(
        &self,
        state: Option<Arc<S>>,
        action: &Action,
        restored: &Map<String, Value>,
    ) -> Arc<S> {
        let restored = restored.get(&self.key).and_then(|value| {
            match serde_json::from_value::<S>(value.clone()) {
                Ok(slice) => Some(Arc::new(slice)),
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "Persistence: restored value for '{}' does not fit the slice, keeping current state: {}",
                        self.key,
                        _e
                    );
                    None
                }
            }
        });

        let next = match (restored, state) {
            (Some(restored), _) => restored,
            (None, Some(previous)) => previous,
            (None, None) => self.inner.reduce(None, action),
        };

        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
        tracker.hydrated = true;
        tracker.last = Some(next.clone());
        next
    }
}

impl<S, F> Reducer<S> for PersistedReducer<S, F>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Reducer<S>,
{
    fn reduce(&self, state: Option<Arc<S>>, action: &Action) -> Arc<S> {
        if let Some(restored) = action.restore_payload() {
            return self.absorb_restore(state, action, restored);
        }

        let next = self.inner.reduce(state, action);

        let changed = {
            let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = tracker
                .last
                .as_ref()
                .map_or(true, |last| !Arc::ptr_eq(last, &next));
            tracker.last = Some(next.clone());
            changed && tracker.hydrated
        };

        if changed && (self.filter)(action) {
            match serde_json::to_value(&*next) {
                Ok(value) => self.sink.enqueue(&self.key, value),
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Persistence: failed to serialize '{}': {}", self.key, _e);
                }
            }
        }

        next
    }
}

impl<S, F> fmt::Debug for PersistedReducer<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedReducer")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Reducer combination
// ============================================================================

type AnySlice = Arc<dyn Any + Send + Sync>;

/// Type-erased slice reducer inside a [`CombinedReducer`].
pub(crate) trait SliceReducer: Send + Sync {
    fn reduce_slice(&self, state: Option<AnySlice>, action: &Action) -> AnySlice;
}

/// Where a persisted slice writes to.
pub(crate) struct SliceBinding {
    pub key: String,
    pub sink: Arc<dyn WriteBack>,
    pub filter: ActionFilter,
}

/// A registered slice that can be combined as-is or wrapped for persistence.
pub(crate) trait SliceEntry: Send + Sync {
    fn plain(self: Box<Self>) -> Box<dyn SliceReducer>;
    fn persisted(self: Box<Self>, binding: SliceBinding) -> Box<dyn SliceReducer>;
}

struct TypedSlice<S, F> {
    reducer: F,
    _state: PhantomData<fn() -> S>,
}

impl<S, F> TypedSlice<S, F> {
    fn new(reducer: F) -> Self {
        Self {
            reducer,
            _state: PhantomData,
        }
    }
}

impl<S, F> SliceReducer for TypedSlice<S, F>
where
    S: Send + Sync + 'static,
    F: Reducer<S>,
{
    fn reduce_slice(&self, state: Option<AnySlice>, action: &Action) -> AnySlice {
        // A slice of the wrong type is treated like a missing one.
        let typed = state.and_then(|slice| slice.downcast::<S>().ok());
        self.reducer.reduce(typed, action)
    }
}

impl<S, F> SliceEntry for TypedSlice<S, F>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    F: Reducer<S>,
{
    fn plain(self: Box<Self>) -> Box<dyn SliceReducer> {
        self
    }

    fn persisted(self: Box<Self>, binding: SliceBinding) -> Box<dyn SliceReducer> {
        let persisted =
            PersistedReducer::new(self.reducer, binding.key, binding.sink, binding.filter);
        Box::new(TypedSlice::<S, _>::new(persisted))
    }
}

/// Named slice reducers, each with its own state type.
#[derive(Default)]
pub struct ReducerMap {
    entries: Vec<(String, Box<dyn SliceEntry>)>,
}

impl ReducerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the reducer for the slice under `key`, replacing an earlier one.
    pub fn slice<S, F>(mut self, key: impl Into<String>, reducer: F) -> Self
    where
        S: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Reducer<S>,
    {
        let key = key.into();
        let entry: Box<dyn SliceEntry> = Box::new(TypedSlice::<S, F>::new(reducer));
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((key, entry)),
        }
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Combines the slices without persisting any of them.
    pub fn combine(self) -> CombinedReducer {
        CombinedReducer::from_slices(
            self.entries
                .into_iter()
                .map(|(key, entry)| (key, entry.plain()))
                .collect(),
        )
    }

    pub(crate) fn into_entries(self) -> Vec<(String, Box<dyn SliceEntry>)> {
        self.entries
    }
}

impl fmt::Debug for ReducerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerMap")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// State produced by a [`CombinedReducer`]: one slice per key.
#[derive(Clone, Default)]
pub struct CombinedState {
    slices: BTreeMap<String, AnySlice>,
}

impl CombinedState {
    /// The slice under `key`, if present and of type `S`.
    pub fn get<S: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<S>> {
        self.slices.get(key)?.clone().downcast::<S>().ok()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slices.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

impl fmt::Debug for CombinedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinedState")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One reducer over a [`CombinedState`], delegating each slice to its reducer.
///
/// Returns the previous state allocation when no slice changed.
pub struct CombinedReducer {
    slices: Vec<(String, Box<dyn SliceReducer>)>,
}

impl CombinedReducer {
    pub(crate) fn from_slices(slices: Vec<(String, Box<dyn SliceReducer>)>) -> Self {
        Self { slices }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.iter().map(|(key, _)| key.as_str())
    }
}

impl Reducer<CombinedState> for CombinedReducer {
    fn reduce(&self, state: Option<Arc<CombinedState>>, action: &Action) -> Arc<CombinedState> {
        let mut changed = state
            .as_ref()
            .map_or(true, |state| state.slices.len() != self.slices.len());
        let mut slices = BTreeMap::new();

        for (key, reducer) in &self.slices {
            let previous = state.as_ref().and_then(|state| state.slices.get(key).cloned());
            let next = reducer.reduce_slice(previous.clone(), action);
            changed |= previous.map_or(true, |previous| !Arc::ptr_eq(&previous, &next));
            slices.insert(key.clone(), next);
        }

        match state {
            Some(state) if !changed => state,
            _ => Arc::new(CombinedState { slices }),
        }
    }
}

impl fmt::Debug for CombinedReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinedReducer")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}
