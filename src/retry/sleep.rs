//! Suspension between attempts.
//!
//! The retry loop never sleeps directly; it asks a [`Sleeper`] (async) or a
//! [`BlockingSleeper`] (synchronous) to wait. [`SystemSleeper`] implements
//! both with the real clock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Waits without blocking the executor.
pub trait Sleeper {
    /// Suspend the current task for `delay`.
    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send;
}

/// Waits by blocking the current thread.
pub trait BlockingSleeper {
    /// Block the current thread for `delay`.
    fn sleep_blocking(&self, delay: Duration);
}

/// Sleeps on the real clock.
///
/// The async implementation uses `tokio::time::sleep` and requires the
/// `async` feature; the blocking one uses `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSleeper;

#[cfg(feature = "async")]
impl Sleeper for SystemSleeper {
    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(delay)
    }
}

impl BlockingSleeper for SystemSleeper {
    fn sleep_blocking(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

impl<S: Sleeper> Sleeper for Arc<S> {
    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send {
        (**self).sleep(delay)
    }
}

impl<S: BlockingSleeper + ?Sized> BlockingSleeper for Arc<S> {
    fn sleep_blocking(&self, delay: Duration) {
        (**self).sleep_blocking(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_blocking_sleep_elapses() {
        let start = Instant::now();
        SystemSleeper.sleep_blocking(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[cfg(feature = "async")]
    #[tokio::test(start_paused = true)]
    async fn test_async_sleep_fully_elapses() {
        let start = tokio::time::Instant::now();
        SystemSleeper.sleep(Duration::from_secs(64)).await;
        assert!(start.elapsed() >= Duration::from_secs(64));
    }

    #[cfg(feature = "async")]
    #[tokio::test(start_paused = true)]
    async fn test_shared_sleeper_delegates() {
        let sleeper = Arc::new(SystemSleeper);
        let start = tokio::time::Instant::now();
        sleeper.sleep(Duration::from_secs(3)).await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
