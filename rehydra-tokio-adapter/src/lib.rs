//! Tokio Adapter for rehydra
//!
//! Runs the persistence engine on the Tokio runtime and ships a file-backed
//! [`RawStorage`](rehydra_core::RawStorage) for std environments.
//!
//! - **Runtime Module**: [`TokioAdapter`] spawns flush timers, purges and gate
//!   resolution on the ambient Tokio runtime
//! - **Time Module**: `TimeOps` over `tokio::time`, so paused test clocks drive
//!   the coalescing window
//! - **Storage Module**: [`FsStorage`], one file per key, every operation
//!   deferred
//!
//! # Example
//!
//! ```rust,ignore
//! use rehydra_core::Persistor;
//! use rehydra_tokio_adapter::{FsStorage, TokioAdapter};
//!
//! let persistor = Persistor::builder()
//!     .runtime(Arc::new(TokioAdapter::new()?))
//!     .default_storage(Arc::new(FsStorage::new("./state")))
//!     .build()?;
//! ```

pub mod runtime;
pub mod storage;
pub mod time;

pub use runtime::TokioAdapter;
pub use storage::FsStorage;
