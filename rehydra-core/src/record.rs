//! On-storage record format.
//!
//! Each persisted key holds one JSON array `[value, written_at_ms]`. The
//! second element is the wall-clock time of the flush that wrote it. Expiry is
//! decided at read time against the TTL registered *now* for the key, not the
//! TTL that was in force when the record was written.

use core::time::Duration;

use serde_json::Value;

/// One persisted slot: the serialized state slice and its write timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedRecord {
    pub value: Value,
    /// Unix timestamp in milliseconds when the value was flushed.
    pub written_at: u64,
}

impl PersistedRecord {
    pub fn new(value: Value, written_at: u64) -> Self {
        Self { value, written_at }
    }

    /// Encodes the record as the `[value, written_at]` pair stored in the backend.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&(&self.value, self.written_at))
    }

    /// Parses a raw slot. Anything other than a two-element array whose second
    /// element is an unsigned integer is rejected.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        let (value, written_at): (Value, u64) = serde_json::from_str(raw)?;
        Ok(Self { value, written_at })
    }

    /// Whether the record is past `ttl` at `now_millis`.
    ///
    /// `None` and a zero TTL never expire. A record becomes stale exactly at
    /// `written_at + ttl`.
    pub fn is_expired(&self, ttl: Option<Duration>, now_millis: u64) -> bool {
        match ttl {
            Some(ttl) if !ttl.is_zero() => {
                let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
                now_millis >= self.written_at.saturating_add(ttl_ms)
            }
            _ => false,
        }
    }
}
