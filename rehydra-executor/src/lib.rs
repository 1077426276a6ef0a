//! Rehydra Executor Traits
//!
//! Pure trait definitions for async execution across different runtime environments.
//! The persistence engine depends on these abstractions rather than on a concrete
//! runtime: the coalescing timer of a storage adapter, fire-and-forget purges of
//! stale records and render-gate resolution are all expressed through them.
//!
//! # Trait Structure
//!
//! 1. **`RuntimeAdapter`** - Platform identity
//! 2. **`TimeOps`** - Time operations (now, sleep, duration helpers)
//! 3. **`Spawn`** - Detached task spawning
//!
//! [`Runtime`] bundles all three and is implemented automatically.

use core::future::Future;

// ============================================================================
// Error Types
// ============================================================================

pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Spawn failed: {message}")]
    SpawnFailed { message: String },

    #[error("Runtime unavailable: {message}")]
    RuntimeUnavailable { message: String },
}

// ============================================================================
// Core Traits
// ============================================================================

/// Core runtime adapter trait - provides identity
pub trait RuntimeAdapter: Send + Sync + 'static {
    fn runtime_name() -> &'static str
    where
        Self: Sized;
}

/// Time operations trait
///
/// `Instant` is the runtime's monotonic clock. Wall-clock timestamps for
/// persisted records are not taken from here; see `rehydra_core::time::Clock`.
pub trait TimeOps: RuntimeAdapter {
    type Instant: Clone + Send + Sync + core::fmt::Debug + 'static;
    type Duration: Clone + Send + Sync + core::fmt::Debug + 'static;

    fn now(&self) -> Self::Instant;
    fn duration_since(
        &self,
        later: Self::Instant,
        earlier: Self::Instant,
    ) -> Option<Self::Duration>;
    fn millis(&self, ms: u64) -> Self::Duration;
    fn secs(&self, secs: u64) -> Self::Duration;
    fn sleep(&self, duration: Self::Duration) -> impl Future<Output = ()> + Send;
}

/// Task spawning trait - adapter-specific implementation
///
/// Spawned tasks are detached: nothing in the engine joins them.
pub trait Spawn: RuntimeAdapter {
    type SpawnToken: Send + 'static;
    fn spawn<F>(&self, future: F) -> ExecutorResult<Self::SpawnToken>
    where
        F: Future<Output = ()> + Send + 'static;
}

// ============================================================================
// Convenience Trait Bundle
// ============================================================================

/// Complete runtime trait bundle
pub trait Runtime: RuntimeAdapter + TimeOps + Spawn {
    fn runtime_info(&self) -> RuntimeInfo
    where
        Self: Sized,
    {
        RuntimeInfo {
            name: Self::runtime_name(),
        }
    }
}

// Auto-implement Runtime for any type with all traits
impl<T> Runtime for T where T: RuntimeAdapter + TimeOps + Spawn {}

#[derive(Debug, Clone)]
pub struct RuntimeInfo {
    pub name: &'static str,
}
