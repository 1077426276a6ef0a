//! Persistor and its builder.
//!
//! A [`Persistor`] is the explicit home of what would otherwise be global
//! state: the adapter pool and the persistence registry. Build one per store;
//! independent stores in one process (tests in particular) never see each
//! other's keys.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use rehydra_executor::Runtime;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::action::{default_action_filter, Action, ActionFilter};
use crate::adapter::StorageAdapter;
use crate::config::PersistorConfig;
use crate::error::{PersistError, PersistResult};
use crate::pool::AdapterPool;
use crate::reducer::{
    CombinedReducer, PersistMapOptions, PersistOptions, PersistedReducer, Reducer, ReducerMap,
    SliceBinding,
};
use crate::registry::{PersistenceRegistry, Registration};
use crate::storage::{DefaultStorage, RawStorage};
use crate::time::{Clock, SystemClock};

/// Persistence engine bound to one runtime.
///
/// # Example
///
/// ```rust,ignore
/// let persistor = Persistor::builder()
///     .runtime(Arc::new(TokioAdapter::new()?))
///     .default_storage(Arc::new(MemoryStorage::new()))
///     .build()?;
///
/// let count = persistor.persist_reducer(count, PersistOptions::new("count"))?;
/// ```
pub struct Persistor<R: Runtime> {
    runtime: Arc<R>,
    config: PersistorConfig,
    default_storage: Option<Arc<dyn RawStorage>>,
    pool: AdapterPool<R>,
    registry: PersistenceRegistry<R>,
    action_filter: ActionFilter,
}

impl<R: Runtime> Persistor<R> {
    pub fn builder() -> PersistorBuilder<R> {
        PersistorBuilder::new()
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    pub fn config(&self) -> &PersistorConfig {
        &self.config
    }

    pub fn registry(&self) -> &PersistenceRegistry<R> {
        &self.registry
    }

    pub fn pool(&self) -> &AdapterPool<R> {
        &self.pool
    }

    /// Resolves the adapter for `storage`, falling back to the persistor's
    /// default backend and then to [`DefaultStorage`].
    ///
    /// # Errors
    /// [`PersistError::MissingStorage`] naming `key` when no backend resolves.
    pub fn adapter_for(
        &self,
        key: &str,
        storage: Option<&Arc<dyn RawStorage>>,
    ) -> PersistResult<Arc<StorageAdapter<R>>> {
        let storage = match storage.or(self.default_storage.as_ref()) {
            Some(storage) => storage.clone(),
            None => DefaultStorage::get().ok_or_else(|| PersistError::MissingStorage {
                key: key.to_string(),
            })?,
        };
        Ok(self.pool.adapter_for(&storage))
    }

    /// Wraps `reducer` so its state is restored from and written to storage
    /// under `options.key`.
    pub fn persist_reducer<S, F>(
        &self,
        reducer: F,
        options: PersistOptions,
    ) -> PersistResult<PersistedReducer<S, F>>
    where
        S: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Reducer<S>,
    {
        let adapter = self.adapter_for(&options.key, options.storage.as_ref())?;
        let expiration = options
            .expiration
            .or_else(|| self.config.default_expiration());

        self.registry.register(
            options.key.clone(),
            Registration {
                adapter: adapter.clone(),
                expiration,
            },
        );

        Ok(PersistedReducer::new(
            reducer,
            options.key,
            adapter,
            self.action_filter.clone(),
        ))
    }

    /// Combines `reducers`, persisting the slices `options` selects.
    ///
    /// Nothing is registered if the backend cannot be resolved.
    pub fn persist_reducers(
        &self,
        reducers: ReducerMap,
        options: PersistMapOptions,
    ) -> PersistResult<CombinedReducer> {
        let separator = self.config.key_separator.as_str();
        let first_persisted = reducers
            .keys()
            .find(|key| options.includes(key))
            .map(|key| options.storage_key(key, separator));

        let adapter = match first_persisted {
            Some(storage_key) => Some(self.adapter_for(&storage_key, options.storage.as_ref())?),
            None => None,
        };
        let expiration = options
            .expiration
            .or_else(|| self.config.default_expiration());

        let mut slices = Vec::with_capacity(reducers.len());
        for (key, entry) in reducers.into_entries() {
            let adapter = match &adapter {
                Some(adapter) if options.includes(&key) => adapter.clone(),
                _ => {
                    slices.push((key, entry.plain()));
                    continue;
                }
            };

            let storage_key = options.storage_key(&key, separator);
            self.registry.register(
                storage_key.clone(),
                Registration {
                    adapter: adapter.clone(),
                    expiration,
                },
            );

            let binding = SliceBinding {
                key: storage_key,
                sink: adapter,
                filter: self.action_filter.clone(),
            };
            slices.push((key, entry.persisted(binding)));
        }

        Ok(CombinedReducer::from_slices(slices))
    }

    /// Writes every registered adapter's buffer now instead of waiting for
    /// its coalescing window.
    pub async fn flush(&self) {
        let mut adapters: Vec<Arc<StorageAdapter<R>>> = Vec::new();
        for (_, registration) in self.registry.snapshot() {
            if !adapters
                .iter()
                .any(|adapter| Arc::ptr_eq(adapter, &registration.adapter))
            {
                adapters.push(registration.adapter);
            }
        }

        for adapter in adapters {
            adapter.flush().await;
        }
    }
}

impl<R: Runtime> fmt::Debug for Persistor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persistor")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Persistor`].
pub struct PersistorBuilder<R: Runtime> {
    runtime: Option<Arc<R>>,
    config: PersistorConfig,
    default_storage: Option<Arc<dyn RawStorage>>,
    clock: Option<Arc<dyn Clock>>,
    action_filter: Option<ActionFilter>,
}

impl<R: Runtime> Default for PersistorBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Runtime> PersistorBuilder<R> {
    pub fn new() -> Self {
        Self {
            runtime: None,
            config: PersistorConfig::default(),
            default_storage: None,
            clock: None,
            action_filter: None,
        }
    }

    /// Sets the runtime adapter. Required.
    pub fn runtime(mut self, runtime: Arc<R>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Replaces the whole configuration; later setters override its fields.
    pub fn config(mut self, config: PersistorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn flush_window(mut self, window: Duration) -> Self {
        self.config.flush_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn default_expiration(mut self, expiration: Duration) -> Self {
        self.config.default_expiration_ms =
            Some(u64::try_from(expiration.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn key_separator(mut self, separator: impl Into<String>) -> Self {
        self.config.key_separator = separator.into();
        self
    }

    /// Backend used when wrap options name none. Takes precedence over
    /// [`DefaultStorage`].
    pub fn default_storage(mut self, storage: Arc<dyn RawStorage>) -> Self {
        self.default_storage = Some(storage);
        self
    }

    /// Wall clock for record timestamps. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Predicate deciding which actions may trigger writes.
    /// Defaults to [`default_action_filter`].
    pub fn action_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Action) -> bool + Send + Sync + 'static,
    {
        self.action_filter = Some(Arc::new(filter));
        self
    }

    pub fn build(self) -> PersistResult<Persistor<R>> {
        let runtime = self.runtime.ok_or(PersistError::MissingRuntime)?;
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let pool = AdapterPool::new(runtime.clone(), clock, self.config.flush_window());

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Persistence: persistor ready (flush window {}ms)",
            self.config.flush_window_ms
        );

        Ok(Persistor {
            runtime,
            config: self.config,
            default_storage: self.default_storage,
            pool,
            registry: PersistenceRegistry::new(),
            action_filter: self.action_filter.unwrap_or_else(default_action_filter),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::test_util::TestRuntime;

    fn count(state: Option<Arc<i64>>, _action: &Action) -> Arc<i64> {
        state.unwrap_or_else(|| Arc::new(0))
    }

    fn persistor(storage: Arc<dyn RawStorage>) -> Persistor<TestRuntime> {
        Persistor::builder()
            .runtime(Arc::new(TestRuntime))
            .default_storage(storage)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_runtime() {
        let err = PersistorBuilder::<TestRuntime>::new().build().unwrap_err();
        assert!(matches!(err, PersistError::MissingRuntime));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let err = Persistor::builder()
            .runtime(Arc::new(TestRuntime))
            .flush_window(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, PersistError::InvalidConfig(_)));
    }

    #[test]
    fn test_persist_reducer_registers_key_with_default_ttl() {
        let persistor = Persistor::builder()
            .runtime(Arc::new(TestRuntime))
            .default_storage(Arc::new(MemoryStorage::new()))
            .default_expiration(Duration::from_secs(60))
            .build()
            .unwrap();

        let wrapped = persistor
            .persist_reducer(count, PersistOptions::new("count"))
            .unwrap();
        assert_eq!(wrapped.key(), "count");

        let registration = persistor.registry().get("count").unwrap();
        assert_eq!(registration.expiration, Some(Duration::from_secs(60)));

        persistor
            .persist_reducer(
                count,
                PersistOptions::new("short").expiration(Duration::from_secs(1)),
            )
            .unwrap();
        assert_eq!(
            persistor.registry().get("short").unwrap().expiration,
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_persist_reducers_selects_and_prefixes() {
        let persistor = persistor(Arc::new(MemoryStorage::new()));
        let map = ReducerMap::new()
            .slice("a", count)
            .slice("b", count)
            .slice("c", count);

        let root = persistor
            .persist_reducers(map, PersistMapOptions::new().prefix("app").black_list(["b"]))
            .unwrap();

        assert_eq!(root.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(persistor.registry().keys(), vec!["app.a", "app.c"]);
    }

    #[test]
    fn test_keys_on_one_backend_share_an_adapter() {
        let shared: Arc<dyn RawStorage> = Arc::new(MemoryStorage::new());
        let persistor = persistor(Arc::new(MemoryStorage::new()));

        persistor
            .persist_reducer(count, PersistOptions::new("x").storage(shared.clone()))
            .unwrap();
        persistor
            .persist_reducer(count, PersistOptions::new("y").storage(shared))
            .unwrap();

        let x = persistor.registry().get("x").unwrap();
        let y = persistor.registry().get("y").unwrap();
        assert!(Arc::ptr_eq(&x.adapter, &y.adapter));
        assert_eq!(persistor.pool().live_adapters(), 1);
    }

    #[test]
    fn test_adapters_are_scoped_to_their_persistor() {
        let shared: Arc<dyn RawStorage> = Arc::new(MemoryStorage::new());
        let first = persistor(shared.clone());
        let second = persistor(shared.clone());

        let a = first.adapter_for("count", None).unwrap();
        let b = second.adapter_for("count", None).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &first.adapter_for("count", Some(&shared)).unwrap()));
    }

    #[test]
    fn test_custom_key_separator() {
        let persistor = Persistor::builder()
            .runtime(Arc::new(TestRuntime))
            .default_storage(Arc::new(MemoryStorage::new()))
            .key_separator("::")
            .build()
            .unwrap();

        persistor
            .persist_reducers(
                ReducerMap::new().slice("count", count),
                PersistMapOptions::new().prefix("app"),
            )
            .unwrap();
        assert!(persistor.registry().contains("app::count"));
    }
}
