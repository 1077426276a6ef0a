//! Render gate.
//!
//! A [`PersistGate`] holds back the "ready" branch of a view until the restore
//! handle returned by [`Persistor::persist_store`] has settled. Tearing the
//! gate down before that happens turns the eventual resolution into a no-op.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rehydra_executor::{Runtime, Spawn};

use crate::builder::Persistor;
use crate::deferred::Deferred;
use crate::error::{PersistError, PersistResult};

/// Observable gate state. `Pending` only ever moves to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Pending,
    Ready,
}

/// Called when a pending gate becomes ready, typically to request a re-render.
pub type PhaseListener = Box<dyn Fn(GatePhase) + Send + Sync>;

struct GateShared {
    ready: AtomicBool,
    unmounted: AtomicBool,
    listener: Option<PhaseListener>,
}

impl GateShared {
    fn settle(&self) {
        if self.unmounted.load(Ordering::Acquire) {
            return;
        }
        self.ready.store(true, Ordering::Release);

        // Teardown may race the store above; the listener belongs to the mounted view.
        if self.unmounted.load(Ordering::Acquire) {
            return;
        }
        if let Some(listener) = &self.listener {
            listener(GatePhase::Ready);
        }
    }
}

/// Withholds ready content until restore completes.
pub struct PersistGate {
    shared: Arc<GateShared>,
}

impl PersistGate {
    /// Mounts a gate over `handle`.
    ///
    /// A settled handle makes the gate ready immediately. A pending one is
    /// awaited on `runtime`.
    pub fn mount<R: Spawn>(runtime: &R, handle: Deferred<bool>) -> PersistResult<Self> {
        Self::mount_inner(runtime, handle, None)
    }

    /// Like [`mount`](Self::mount), invoking `listener` when a pending gate
    /// becomes ready. The listener is never called after [`unmount`](Self::unmount).
    pub fn mount_with_listener<R, L>(
        runtime: &R,
        handle: Deferred<bool>,
        listener: L,
    ) -> PersistResult<Self>
    where
        R: Spawn,
        L: Fn(GatePhase) + Send + Sync + 'static,
    {
        Self::mount_inner(runtime, handle, Some(Box::new(listener)))
    }

    fn mount_inner<R: Spawn>(
        runtime: &R,
        handle: Deferred<bool>,
        listener: Option<PhaseListener>,
    ) -> PersistResult<Self> {
        let shared = Arc::new(GateShared {
            ready: AtomicBool::new(false),
            unmounted: AtomicBool::new(false),
            listener,
        });

        match handle {
            Deferred::Ready(_) => shared.ready.store(true, Ordering::Release),
            Deferred::Pending(restore) => {
                let task_shared = shared.clone();
                runtime
                    .spawn(async move {
                        let _restored = restore.await;
                        task_shared.settle();
                    })
                    .map_err(|source| PersistError::Spawn {
                        task: "persist gate",
                        source,
                    })?;
            }
        }

        Ok(Self { shared })
    }

    pub fn phase(&self) -> GatePhase {
        if self.is_ready() {
            GatePhase::Ready
        } else {
            GatePhase::Pending
        }
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    /// Produces the ready branch once restored, the fallback before that.
    pub fn render<T>(&self, ready: impl FnOnce() -> T, fallback: impl FnOnce() -> T) -> T {
        if self.is_ready() {
            ready()
        } else {
            fallback()
        }
    }

    /// Tears the gate down. Idempotent; also runs on drop.
    pub fn unmount(&self) {
        self.shared.unmounted.store(true, Ordering::Release);
    }

    pub fn is_unmounted(&self) -> bool {
        self.shared.unmounted.load(Ordering::Acquire)
    }
}

impl Drop for PersistGate {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl fmt::Debug for PersistGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistGate")
            .field("phase", &self.phase())
            .field("unmounted", &self.is_unmounted())
            .finish()
    }
}

impl<R: Runtime> Persistor<R> {
    /// Mounts a [`PersistGate`] over a restore handle on this persistor's runtime.
    pub fn gate(&self, handle: Deferred<bool>) -> PersistResult<PersistGate> {
        PersistGate::mount(&**self.runtime(), handle)
    }

    pub fn gate_with_listener<L>(&self, handle: Deferred<bool>, listener: L) -> PersistResult<PersistGate>
    where
        L: Fn(GatePhase) + Send + Sync + 'static,
    {
        PersistGate::mount_with_listener(&**self.runtime(), handle, listener)
    }
}
