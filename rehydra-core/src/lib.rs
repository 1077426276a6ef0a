//! Rehydra Core Persistence Engine
//!
//! Transparently saves selected slices of a reducer-driven state container to a
//! pluggable key/value backend, restores them on startup and expires stale
//! entries.
//!
//! This crate provides:
//!
//! - [`RawStorage`] trait for pluggable backends, each operation possibly deferred
//! - [`StorageAdapter`]: write-debouncing and per-key expiration over one backend
//! - [`AdapterPool`]: one adapter per backend instance
//! - [`PersistenceRegistry`]: persistence key → adapter + TTL
//! - [`Persistor::persist_reducer`] / [`Persistor::persist_reducers`]: reducer interception
//! - [`Persistor::persist_store`]: one consolidated restore action at startup
//! - [`PersistGate`]: withholds rendering until the restore completes
//!
//! # Usage
//!
//! ```rust,ignore
//! use rehydra_core::{MemoryStorage, PersistMapOptions, Persistor, ReducerMap};
//! use rehydra_tokio_adapter::TokioAdapter;
//!
//! let persistor = Persistor::builder()
//!     .runtime(Arc::new(TokioAdapter::new()?))
//!     .default_storage(Arc::new(MemoryStorage::new()))
//!     .build()?;
//!
//! let reducers = ReducerMap::new().slice("count", count).slice("todos", todos);
//! let root = persistor.persist_reducers(
//!     reducers,
//!     PersistMapOptions::new().prefix("app").white_list(["count"]),
//! )?;
//!
//! let store = Arc::new(MyStore::new(root));
//! let restored = persistor.persist_store(store.clone());
//! let gate = persistor.gate(restored)?;
//! ```

pub mod action;
pub mod adapter;
pub mod builder;
pub mod config;
pub mod deferred;
mod error;
pub mod gate;
pub mod pool;
pub mod record;
pub mod reducer;
pub mod registry;
pub mod restore;
pub mod storage;
pub mod time;

#[cfg(test)]
mod test_util;

pub use action::{default_action_filter, Action, ActionFilter, RESTORE_ACTION_TYPE};
pub use adapter::{StorageAdapter, WriteBack};
pub use builder::{Persistor, PersistorBuilder};
pub use config::PersistorConfig;
pub use deferred::{BoxFuture, Deferred};
pub use error::{PersistError, PersistResult, StorageError, StorageResult};
pub use gate::{GatePhase, PersistGate, PhaseListener};
pub use pool::AdapterPool;
pub use record::PersistedRecord;
pub use reducer::{
    CombinedReducer, CombinedState, PersistMapOptions, PersistOptions, PersistedReducer,
    Reducer, ReducerMap,
};
pub use registry::{PersistenceRegistry, Registration};
pub use restore::Dispatch;
pub use storage::{DefaultStorage, MemoryStorage, RawStorage};
pub use time::{Clock, ManualClock, SystemClock};

pub use rehydra_executor::{
    ExecutorError, ExecutorResult, Runtime, RuntimeAdapter, RuntimeInfo, Spawn, TimeOps,
};
