//! Persistor configuration.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PersistError, PersistResult};

/// Tunables for a [`Persistor`](crate::Persistor).
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// use rehydra_core::PersistorConfig;
///
/// let config = PersistorConfig::from_json(r#"{ "default_expiration_ms": 86400000 }"#).unwrap();
/// assert_eq!(config.flush_window_ms, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PersistorConfig {
    /// Coalescing window before buffered writes are flushed.
    pub flush_window_ms: u64,
    /// TTL applied when neither the reducer options nor the map options name one.
    pub default_expiration_ms: Option<u64>,
    /// Joins a map prefix and a slice key into a persistence key.
    pub key_separator: String,
}

impl Default for PersistorConfig {
    fn default() -> Self {
        Self {
            flush_window_ms: 100,
            default_expiration_ms: None,
            key_separator: ".".to_string(),
        }
    }
}

impl PersistorConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> PersistResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PersistError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PersistResult<()> {
        if self.flush_window_ms == 0 {
            return Err(PersistError::InvalidConfig(
                "flush_window_ms must be greater than zero".to_string(),
            ));
        }
        if self.key_separator.is_empty() {
            return Err(PersistError::InvalidConfig(
                "key_separator must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn flush_window(&self) -> Duration {
        Duration::from_millis(self.flush_window_ms)
    }

    pub fn default_expiration(&self) -> Option<Duration> {
        self.default_expiration_ms.map(Duration::from_millis)
    }
}
