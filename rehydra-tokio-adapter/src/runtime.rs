//! Tokio Runtime Adapter for rehydra
//!
//! Provides the Tokio implementation of the executor traits used by the
//! persistence engine for its background work.

use core::future::Future;

use rehydra_executor::{ExecutorError, ExecutorResult, RuntimeAdapter, Spawn};
use tokio::runtime::Handle;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Tokio runtime adapter.
///
/// Captures the runtime handle when it is created and spawns through it, so
/// the engine's timers and purges work even when the store dispatches from a
/// thread that is not part of the runtime.
///
/// # Example
/// ```rust,no_run
/// use rehydra_tokio_adapter::TokioAdapter;
/// use rehydra_executor::Spawn;
///
/// # #[tokio::main]
/// # async fn main() -> rehydra_executor::ExecutorResult<()> {
/// let adapter = TokioAdapter::new()?;
/// adapter.spawn(async { /* background work */ })?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokioAdapter {
    handle: Handle,
}

impl TokioAdapter {
    /// Creates an adapter bound to the current Tokio runtime.
    ///
    /// # Errors
    /// `RuntimeUnavailable` when called outside a Tokio runtime.
    pub fn new() -> ExecutorResult<Self> {
        match Handle::try_current() {
            Ok(handle) => Ok(Self::from_handle(handle)),
            Err(e) => {
                #[cfg(feature = "tracing")]
                warn!("TokioAdapter created outside of a Tokio runtime: {}", e);

                Err(ExecutorError::RuntimeUnavailable {
                    message: e.to_string(),
                })
            }
        }
    }

    /// Creates an adapter that spawns onto `handle`.
    pub fn from_handle(handle: Handle) -> Self {
        #[cfg(feature = "tracing")]
        debug!("Creating TokioAdapter");

        Self { handle }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl RuntimeAdapter for TokioAdapter {
    fn runtime_name() -> &'static str {
        "tokio"
    }
}

impl Spawn for TokioAdapter {
    type SpawnToken = tokio::task::JoinHandle<()>;

    fn spawn<F>(&self, future: F) -> ExecutorResult<Self::SpawnToken>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Ok(self.handle.spawn(future))
    }
}
