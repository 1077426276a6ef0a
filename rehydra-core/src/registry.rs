//! Persistence registry: which adapter and TTL guard each persistence key.
//!
//! Populated as reducers are persisted and read by the restore pass. A key
//! registered twice keeps only the latest registration; colliding keys are
//! not rejected, so map prefixes are the caller's tool for keeping them apart.

use core::fmt;
use core::time::Duration;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use rehydra_executor::Runtime;

use crate::adapter::StorageAdapter;

/// The adapter and expiration policy for one persistence key.
pub struct Registration<R: Runtime> {
    pub adapter: Arc<StorageAdapter<R>>,
    pub expiration: Option<Duration>,
}

impl<R: Runtime> Clone for Registration<R> {
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
            expiration: self.expiration,
        }
    }
}

impl<R: Runtime> fmt::Debug for Registration<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("adapter", &self.adapter)
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Persistence key → [`Registration`].
pub struct PersistenceRegistry<R: Runtime> {
    entries: RwLock<BTreeMap<String, Registration<R>>>,
}

impl<R: Runtime> Default for PersistenceRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Runtime> PersistenceRegistry<R> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers `key`, returning the registration it replaced, if any.
    pub fn register(
        &self,
        key: impl Into<String>,
        registration: Registration<R>,
    ) -> Option<Registration<R>> {
        let key = key.into();
        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), registration);

        #[cfg(feature = "tracing")]
        {
            if previous.is_some() {
                tracing::debug!("Persistence: '{}' re-registered, previous entry replaced", key);
            } else {
                tracing::debug!("Persistence: '{}' registered", key);
            }
        }

        previous
    }

    pub fn get(&self, key: &str) -> Option<Registration<R>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Copies every entry out, in key order. Keys registered afterwards are
    /// not part of the snapshot.
    pub fn snapshot(&self) -> Vec<(String, Registration<R>)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, registration)| (key.clone(), registration.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every registration.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl<R: Runtime> fmt::Debug for PersistenceRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
