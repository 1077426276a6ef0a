//! File-backed storage.
//!
//! Every key maps to one file under a root directory. The file name is the
//! hex-encoded key, so any key is a valid file name. Writes go to a temporary
//! sibling first and are renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rehydra_core::{Deferred, RawStorage, StorageError, StorageResult};

#[cfg(feature = "tracing")]
use tracing::debug;

/// Asynchronous [`RawStorage`] over `tokio::fs`.
///
/// Every operation is [`Deferred::Pending`]; the root directory is created on
/// first write.
#[derive(Debug)]
pub struct FsStorage {
    root: Arc<PathBuf>,
    tmp_seq: AtomicU64,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", hex::encode(key)))
    }
}

impl RawStorage for FsStorage {
    fn get_item(&self, key: &str) -> Deferred<StorageResult<Option<String>>> {
        let path = self.path_for(key);
        Deferred::pending(async move {
            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => Ok(Some(raw)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(StorageError::from(e)),
            }
        })
    }

    fn set_item(&self, key: &str, value: String) -> Deferred<StorageResult<()>> {
        let root = self.root.clone();
        let path = self.path_for(key);
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{seq}.tmp"));

        Deferred::pending(async move {
            tokio::fs::create_dir_all(&*root).await?;
            tokio::fs::write(&tmp, value).await?;
            if let Err(e) = tokio::fs::rename(&tmp, &path).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(StorageError::from(e));
            }

            #[cfg(feature = "tracing")]
            debug!("FsStorage: wrote {}", path.display());

            Ok(())
        })
    }

    fn remove_item(&self, key: &str) -> Deferred<StorageResult<()>> {
        let path = self.path_for(key);
        Deferred::pending(async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StorageError::from(e)),
            }
        })
    }
}
