//! Startup restore.
//!
//! Reads every registered key once and hands the store a single
//! [`RESTORE_ACTION_TYPE`](crate::RESTORE_ACTION_TYPE) action carrying all
//! recovered values, so reducers observe the restored state atomically.

use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::FutureExt;
use rehydra_executor::Runtime;
use serde_json::{Map, Value};

use crate::action::Action;
use crate::builder::Persistor;
use crate::deferred::{BoxFuture, Deferred};

/// Anything that accepts actions, usually the application's store.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, action: Action);
}

impl<R: Runtime> Persistor<R> {
    /// Restores every registered key into `store`.
    ///
    /// When every backend answers synchronously the restore action is
    /// dispatched before this returns and the result is
    /// [`Deferred::Ready`]. Otherwise the restore runs on the persistor's
    /// runtime: the reads are awaited together and the action is dispatched
    /// once, after the last of them. The returned handle only reports
    /// completion, so dropping it does not stop the restore.
    ///
    /// Keys that resolve to nothing are left out of the payload; an empty
    /// registry still dispatches an empty restore.
    pub fn persist_store<D>(&self, store: Arc<D>) -> Deferred<bool>
    where
        D: Dispatch + ?Sized + 'static,
    {
        let mut restored = Map::new();
        let mut pending: Vec<BoxFuture<'static, (String, Option<Value>)>> = Vec::new();

        for (key, registration) in self.registry().snapshot() {
            match registration.adapter.read(&key, registration.expiration) {
                Deferred::Ready(value) => {
                    if let Some(value) = value {
                        restored.insert(key, value);
                    }
                }
                Deferred::Pending(read) => {
                    pending.push(Box::pin(async move { (key, read.await) }));
                }
            }
        }

        if pending.is_empty() {
            dispatch_restore(&*store, restored);
            return Deferred::Ready(true);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Persistence: awaiting {} asynchronous read(s)", pending.len());

        let restore: BoxFuture<'static, bool> = Box::pin(async move {
            for (key, value) in join_all(pending).await {
                if let Some(value) = value {
                    restored.insert(key, value);
                }
            }
            dispatch_restore(&*store, restored);
            true
        });
        let restore = restore.shared();

        let driver = restore.clone();
        if let Err(_e) = self.runtime().spawn(async move {
            let _restored = driver.await;
        }) {
            // Still completes if the caller awaits the handle.
            #[cfg(feature = "tracing")]
            tracing::error!("Persistence: failed to spawn restore: {}", _e);
        }

        Deferred::pending(restore)
    }
}

fn dispatch_restore<D: Dispatch + ?Sized>(store: &D, restored: Map<String, Value>) {
    #[cfg(feature = "tracing")]
    tracing::debug!("Persistence: restoring {} key(s)", restored.len());

    store.dispatch(Action::restore(restored));
}
