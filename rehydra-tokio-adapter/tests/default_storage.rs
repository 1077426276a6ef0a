//! Process-wide Default Storage
//!
//! Kept in its own test binary: it installs and clears the global default.

mod common;

use std::sync::Arc;

use common::{counter, MockStorage};
use rehydra_core::{
    DefaultStorage, PersistError, PersistMapOptions, PersistOptions, Persistor, RawStorage,
    ReducerMap,
};
use rehydra_tokio_adapter::TokioAdapter;

#[tokio::test]
async fn test_default_storage_resolution() {
    let persistor = Persistor::builder()
        .runtime(Arc::new(TokioAdapter::new().unwrap()))
        .build()
        .unwrap();

    // Nothing configured: wrapping fails loudly and registers nothing.
    let err = persistor
        .persist_reducer(counter, PersistOptions::new("count"))
        .unwrap_err();
    assert!(matches!(err, PersistError::MissingStorage { ref key } if key == "count"));

    let err = persistor
        .persist_reducers(
            ReducerMap::new().slice("a", counter).slice("b", counter),
            PersistMapOptions::new().prefix("app"),
        )
        .unwrap_err();
    assert!(matches!(err, PersistError::MissingStorage { ref key } if key == "app.a"));
    assert!(persistor.registry().is_empty());

    // Nothing persisted needs no backend.
    persistor
        .persist_reducers(
            ReducerMap::new().slice("a", counter),
            PersistMapOptions::new().white_list(Vec::<String>::new()),
        )
        .unwrap();
    assert!(persistor.registry().is_empty());

    // The process-wide default is picked up.
    let global: Arc<dyn RawStorage> = MockStorage::new();
    DefaultStorage::set(global.clone());
    persistor
        .persist_reducer(counter, PersistOptions::new("count"))
        .unwrap();
    let registered = persistor.registry().get("count").unwrap();
    let via_global = persistor.adapter_for("count", Some(&global)).unwrap();
    assert!(Arc::ptr_eq(&registered.adapter, &via_global));

    // Explicit storage wins over the default.
    let explicit: Arc<dyn RawStorage> = MockStorage::new();
    persistor
        .persist_reducer(counter, PersistOptions::new("other").storage(explicit.clone()))
        .unwrap();
    let registered = persistor.registry().get("other").unwrap();
    let via_explicit = persistor.adapter_for("other", Some(&explicit)).unwrap();
    assert!(Arc::ptr_eq(&registered.adapter, &via_explicit));
    assert!(!Arc::ptr_eq(&registered.adapter, &via_global));

    DefaultStorage::clear();
}
