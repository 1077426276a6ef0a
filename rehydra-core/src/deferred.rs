//! Value-or-future results.
//!
//! Storage backends may answer synchronously (an in-memory map) or
//! asynchronously (a file, a remote service). [`Deferred`] carries either arm
//! so that call sites pattern-match on readiness instead of probing for it.

use core::fmt;
use core::future::Future;
use core::pin::Pin;

/// Type alias matching the boxed-future style used across the workspace (no async_trait).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A result that is either available now or will be produced by a future.
pub enum Deferred<T> {
    Ready(T),
    Pending(BoxFuture<'static, T>),
}

impl<T> Deferred<T> {
    /// Wraps a future as the pending arm.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Deferred::Pending(Box::pin(future))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Deferred::Ready(_))
    }

    /// Returns the value if it is already available, otherwise hands `self` back.
    pub fn into_ready(self) -> Result<T, Self> {
        match self {
            Deferred::Ready(value) => Ok(value),
            pending => Err(pending),
        }
    }

    /// Awaits the value regardless of which arm holds it.
    pub async fn resolve(self) -> T {
        match self {
            Deferred::Ready(value) => value,
            Deferred::Pending(future) => future.await,
        }
    }
}

impl<T> Deferred<T>
where
    T: Send + 'static,
{
    /// Applies `f` to the value, keeping the synchrony of `self`.
    ///
    /// A ready value is transformed immediately; a pending one is transformed
    /// when its future completes.
    pub fn map<U, F>(self, f: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            Deferred::Ready(value) => Deferred::Ready(f(value)),
            Deferred::Pending(future) => Deferred::pending(async move { f(future.await) }),
        }
    }

    /// Boxes either arm into a single future.
    pub fn into_future(self) -> BoxFuture<'static, T> {
        match self {
            Deferred::Ready(value) => Box::pin(async move { value }),
            Deferred::Pending(future) => future,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deferred::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Deferred::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}
