//! Per-invocation backoff state.

use std::time::Duration;

use super::jitter::JitterSource;
use super::policy::RetryPolicy;

/// The mutable half of a retry: how many attempts have failed and how long
/// to wait before the next one.
///
/// A fresh state is created for every invocation of the retried operation
/// and dropped when the invocation returns, so concurrent invocations never
/// share one.
///
/// # Examples
///
/// ```rust
/// use backwater::{RetryPolicy, RetryState};
/// use backwater::testing::ScriptedJitter;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default().with_max_retries(2);
/// let jitter = ScriptedJitter::constant(Duration::from_millis(250));
/// let mut state = RetryState::new();
///
/// assert_eq!(state.current_delay(), Duration::ZERO);
/// assert_eq!(state.record_failure(&policy, &jitter), Some(Duration::from_millis(1250)));
/// assert_eq!(state.record_failure(&policy, &jitter), Some(Duration::from_millis(2250)));
/// assert_eq!(state.record_failure(&policy, &jitter), None);
/// assert_eq!(state.attempt(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    exponent: u32,
    current_delay: Duration,
}

impl RetryState {
    /// Start a new invocation: no failures, no delay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of failed attempts so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Exponent of the next deterministic delay.
    pub fn exponent(&self) -> u32 {
        self.exponent
    }

    /// Delay to apply before the next attempt.
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Record a transient failure and compute the next delay.
    ///
    /// Returns `None` once the failure count exceeds the policy's
    /// `max_retries`; the state is then terminal and `current_delay` keeps
    /// its previous value.
    pub fn record_failure<J>(&mut self, policy: &RetryPolicy, jitter: &J) -> Option<Duration>
    where
        J: JitterSource + ?Sized,
    {
        self.attempt = self.attempt.saturating_add(1);
        if self.attempt > policy.max_retries() {
            return None;
        }

        let noise = jitter.sample(policy.jitter_max()).min(policy.jitter_max());
        let deterministic = policy.exponential_delay(self.exponent);
        let base = if deterministic < policy.max_backoff() {
            self.exponent += 1;
            deterministic
        } else {
            policy.max_backoff()
        };

        self.current_delay = base.saturating_add(noise);
        Some(self.current_delay)
    }
}
