//! Tokio Time Adapter
//!
//! `TimeOps` over `tokio::time`, so a paused Tokio clock also pauses the
//! coalescing window.

use core::future::Future;
use std::time::Duration;

use rehydra_executor::TimeOps;
use tokio::time::Instant;

use crate::TokioAdapter;

impl TimeOps for TokioAdapter {
    type Instant = Instant;
    type Duration = Duration;

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn duration_since(
        &self,
        later: Self::Instant,
        earlier: Self::Instant,
    ) -> Option<Self::Duration> {
        later.checked_duration_since(earlier)
    }

    fn millis(&self, millis: u64) -> Self::Duration {
        Duration::from_millis(millis)
    }

    fn secs(&self, secs: u64) -> Self::Duration {
        Duration::from_secs(secs)
    }

    /// Pauses execution without blocking the runtime.
    fn sleep(&self, duration: Self::Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
