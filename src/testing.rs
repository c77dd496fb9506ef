//! Testing utilities for code that retries.
//!
//! Retries are slow and random by nature. The fakes here make them instant
//! and deterministic, so tests can assert on exact schedules.
//!
//! # Examples
//!
//! ```rust
//! use backwater::{BackoffRetrier, Failure, RetryPolicy};
//! use backwater::testing::{RecordingSleeper, ScriptedJitter, ScriptedOperation};
//! use std::time::Duration;
//!
//! let op = ScriptedOperation::new([
//!     Err(Failure::transient("refused")),
//!     Err(Failure::transient("refused")),
//!     Ok("payload"),
//! ]);
//!
//! let retrier = BackoffRetrier::new(RetryPolicy::default())
//!     .with_jitter(ScriptedJitter::constant(Duration::from_millis(100)))
//!     .with_sleeper(RecordingSleeper::new());
//!
//! assert_eq!(retrier.execute_blocking(|| op.call()), Ok("payload"));
//! assert_eq!(op.calls(), 3);
//! assert_eq!(
//!     retrier.sleeper().delays(),
//!     vec![Duration::from_millis(1100), Duration::from_millis(2100)]
//! );
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{self, Either};

use crate::retry::{BlockingSleeper, Failure, JitterSource, Sleeper};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A sleeper that returns immediately and remembers every requested delay.
///
/// Implements both [`Sleeper`] and [`BlockingSleeper`].
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
    never_wakes: bool,
}

impl RecordingSleeper {
    /// Create a sleeper whose waits complete instantly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sleeper whose async waits never complete.
    ///
    /// Useful for checking that a cancel signal wins the race against a wait.
    pub fn never_wakes() -> Self {
        Self {
            delays: Mutex::new(Vec::new()),
            never_wakes: true,
        }
    }

    /// Every delay requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        lock(&self.delays).clone()
    }

    /// Sum of all requested delays.
    pub fn total(&self) -> Duration {
        lock(&self.delays).iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send {
        lock(&self.delays).push(delay);
        if self.never_wakes {
            Either::Left(future::pending())
        } else {
            Either::Right(future::ready(()))
        }
    }
}

impl BlockingSleeper for RecordingSleeper {
    fn sleep_blocking(&self, delay: Duration) {
        lock(&self.delays).push(delay);
    }
}

/// A jitter source that replays a fixed sequence of samples.
///
/// Once the sequence runs out the last sample repeats. Samples larger than
/// the requested bound are clamped to it.
#[derive(Debug)]
pub struct ScriptedJitter {
    samples: Mutex<VecDeque<Duration>>,
    last: Mutex<Duration>,
}

impl ScriptedJitter {
    /// Replay `samples` in order.
    pub fn new(samples: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            samples: Mutex::new(samples.into_iter().collect()),
            last: Mutex::new(Duration::ZERO),
        }
    }

    /// Always return `sample`.
    pub fn constant(sample: Duration) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            last: Mutex::new(sample),
        }
    }
}

impl JitterSource for ScriptedJitter {
    fn sample(&self, max: Duration) -> Duration {
        let mut last = lock(&self.last);
        if let Some(next) = lock(&self.samples).pop_front() {
            *last = next;
        }
        (*last).min(max)
    }
}

/// An operation that replays scripted outcomes and counts its invocations.
///
/// After the script runs out the final outcome repeats, so a script of one
/// transient failure models an operation that never recovers.
#[derive(Debug)]
pub struct ScriptedOperation<T, E> {
    outcomes: Mutex<VecDeque<Result<T, Failure<E>>>>,
    last: Mutex<Option<Result<T, Failure<E>>>>,
    calls: AtomicU32,
}

impl<T: Clone, E: Clone> ScriptedOperation<T, E> {
    /// Replay `outcomes` in order.
    pub fn new(outcomes: impl IntoIterator<Item = Result<T, Failure<E>>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    /// An operation that fails transiently `failures` times, then returns
    /// `value`.
    pub fn recovers_after(failures: usize, error: E, value: T) -> Self {
        let mut outcomes: Vec<_> = (0..failures)
            .map(|_| Err(Failure::Transient(error.clone())))
            .collect();
        outcomes.push(Ok(value));
        Self::new(outcomes)
    }

    /// An operation that always fails transiently with `error`.
    pub fn always_failing(error: E) -> Self {
        Self::new([Err(Failure::Transient(error))])
    }

    /// Invoke the operation once.
    ///
    /// # Panics
    ///
    /// Panics if the script was empty.
    pub fn call(&self) -> Result<T, Failure<E>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = lock(&self.last);
        if let Some(next) = lock(&self.outcomes).pop_front() {
            *last = Some(next);
        }
        last.clone().expect("ScriptedOperation needs at least one outcome")
    }

    /// Invoke the operation once, as a future.
    pub fn call_async(&self) -> future::Ready<Result<T, Failure<E>>> {
        future::ready(self.call())
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[cfg(feature = "proptest")]
use proptest::prelude::*;

/// Strategy generating small, valid retry policies.
///
/// Retries stay below 20 and durations below a few minutes, so generated
/// policies are cheap to run against a [`RecordingSleeper`].
#[cfg(feature = "proptest")]
pub fn arb_policy() -> impl Strategy<Value = crate::retry::RetryPolicy> {
    (0u32..20, 1u64..300_000, 0u64..5_000).prop_map(|(max_retries, max_backoff_ms, jitter_ms)| {
        crate::retry::RetryPolicy::default()
            .with_max_retries(max_retries)
            .with_max_backoff(Duration::from_millis(max_backoff_ms))
            .with_jitter_max(Duration::from_millis(jitter_ms))
    })
}
