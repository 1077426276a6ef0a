//! Error types for the persistence engine.
//!
//! Only configuration faults are surfaced as errors. Corrupt and expired
//! records are absorbed by the storage adapter and read back as absent.

use rehydra_executor::ExecutorError;

pub type PersistResult<T> = Result<T, PersistError>;

pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised while configuring or driving the persistence engine.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// No backend was supplied for a persisted key and no default is installed.
    #[error(
        "no storage configured for '{key}' (pass one in the options or install a default with DefaultStorage::set)"
    )]
    MissingStorage { key: String },

    /// `PersistorBuilder::build` was called without `.runtime()`.
    #[error("persistor built without a runtime adapter (call .runtime() on the builder)")]
    MissingRuntime,

    #[error("invalid persistor configuration: {0}")]
    InvalidConfig(String),

    #[error("persistence serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to spawn {task}: {source}")]
    Spawn {
        task: &'static str,
        #[source]
        source: ExecutorError,
    },
}

/// Errors reported by a [`RawStorage`](crate::RawStorage) backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}
