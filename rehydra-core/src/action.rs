//! Actions flowing through the host store, and the restore action.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type identifier of the single action that carries restored slices.
pub const RESTORE_ACTION_TYPE: &str = "PERSIST/RESTORE";

/// A tagged event dispatched to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Action {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Builds the restore action carrying `restored` (persistence key → value).
    pub fn restore(restored: Map<String, Value>) -> Self {
        Self::with_payload(RESTORE_ACTION_TYPE, Value::Object(restored))
    }

    pub fn is_restore(&self) -> bool {
        self.kind == RESTORE_ACTION_TYPE
    }

    /// The restored slices, when this is a restore action with an object payload.
    pub fn restore_payload(&self) -> Option<&Map<String, Value>> {
        if self.is_restore() {
            self.payload.as_object()
        } else {
            None
        }
    }
}

/// Decides whether an action may trigger a write of the state it produced.
pub type ActionFilter = Arc<dyn Fn(&Action) -> bool + Send + Sync>;

/// Skips store-internal bookkeeping actions, whose types start with `@@`.
pub fn default_action_filter() -> ActionFilter {
    Arc::new(|action: &Action| !action.kind.starts_with("@@"))
}
