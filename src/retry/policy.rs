//! Retry policy types and configuration.

use std::time::Duration;

use super::error::PolicyError;

/// Default number of retries after the first failed attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 10;
/// Default ceiling on the deterministic backoff delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(64);
/// Default upper bound of the random delay added to every wait.
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(1000);

const BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// A retry policy describing how to retry failed operations.
///
/// Policies are pure data - they describe retry behavior but don't execute it.
/// This makes them easy to test, clone, and share between retriers.
///
/// The deterministic delay before retry `k` (1-indexed) is
/// `2^(k-1)` seconds until that value reaches `max_backoff`, after which
/// every retry waits `max_backoff`. A uniformly random jitter in
/// `[0, jitter_max]` is added on top of every delay.
///
/// # Examples
///
/// ```rust
/// use backwater::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_retries(), 10);
/// assert_eq!(policy.max_backoff(), Duration::from_secs(64));
/// assert_eq!(policy.jitter_max(), Duration::from_millis(1000));
///
/// let policy = RetryPolicy::default()
///     .with_max_retries(5)
///     .with_max_backoff(Duration::from_secs(4));
///
/// let delays: Vec<_> = policy.delays().collect();
/// assert_eq!(
///     delays,
///     [1, 2, 4, 4, 4].map(Duration::from_secs).to_vec()
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    max_backoff: Duration,
    jitter_max: Duration,
}

/// Information about a failed attempt, passed to hooks.
#[derive(Debug, Clone)]
pub struct RetryEvent<'a, E> {
    /// Which attempt just failed (1-indexed).
    pub attempt: u32,
    /// The error from the failed attempt.
    pub error: &'a E,
    /// Delay before next attempt, or `None` if this failure is terminal.
    pub next_delay: Option<Duration>,
    /// Total elapsed time since first attempt.
    ///
    /// Measured with [`std::time::Instant`], so it reports wall-clock time
    /// even when the tokio clock is paused.
    pub elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            max_backoff: DEFAULT_MAX_BACKOFF,
            jitter_max: DEFAULT_JITTER_MAX,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of retry attempts.
    ///
    /// This does not include the initial attempt. For example,
    /// `with_max_retries(3)` means up to 4 total attempts.
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the ceiling on the deterministic part of the delay.
    pub fn with_max_backoff(mut self, d: Duration) -> Self {
        self.max_backoff = d;
        self
    }

    /// Set the ceiling from a number of seconds.
    ///
    /// Fails for negative, zero, NaN or infinite values.
    ///
    /// ```rust
    /// use backwater::{PolicyError, RetryPolicy};
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default().with_max_backoff_secs(2.5).unwrap();
    /// assert_eq!(policy.max_backoff(), Duration::from_millis(2500));
    ///
    /// assert!(matches!(
    ///     RetryPolicy::default().with_max_backoff_secs(-1.0),
    ///     Err(PolicyError::InvalidMaxBackoff(_))
    /// ));
    /// ```
    pub fn with_max_backoff_secs(self, secs: f64) -> Result<Self, PolicyError> {
        let d = positive_secs(secs).ok_or(PolicyError::InvalidMaxBackoff(secs))?;
        Ok(self.with_max_backoff(d))
    }

    /// Set the upper bound of the jitter added to every delay.
    ///
    /// Jitter is sampled at millisecond granularity; `Duration::ZERO`
    /// disables it.
    pub fn with_jitter_max(mut self, d: Duration) -> Self {
        self.jitter_max = d;
        self
    }

    /// Get the maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get the backoff ceiling.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Get the jitter bound.
    pub fn jitter_max(&self) -> Duration {
        self.jitter_max
    }

    /// The deterministic delay of `2^exponent` seconds, saturating at
    /// `Duration::MAX`.
    pub(crate) fn exponential_delay(&self, exponent: u32) -> Duration {
        match 1u32.checked_shl(exponent) {
            Some(factor) => BACKOFF_UNIT.saturating_mul(factor),
            None => Duration::MAX,
        }
    }

    /// Upper bound on any single wait: `max_backoff + jitter_max`.
    pub fn longest_delay(&self) -> Duration {
        self.max_backoff.saturating_add(self.jitter_max)
    }

    /// Iterate over the deterministic (non-jittered) delays, one per
    /// permitted retry.
    pub fn delays(&self) -> Delays<'_> {
        Delays {
            policy: self,
            exponent: 0,
            remaining: self.max_retries,
        }
    }

    /// Validate the policy.
    ///
    /// Returns an error if `max_backoff` is zero.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_backoff.is_zero() {
            return Err(PolicyError::InvalidMaxBackoff(0.0));
        }
        Ok(())
    }
}

/// Iterator over a policy's deterministic delay schedule.
///
/// Created by [`RetryPolicy::delays`].
#[derive(Debug, Clone)]
pub struct Delays<'a> {
    policy: &'a RetryPolicy,
    exponent: u32,
    remaining: u32,
}

impl Iterator for Delays<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let delay = self.policy.exponential_delay(self.exponent);
        if delay < self.policy.max_backoff {
            self.exponent += 1;
            Some(delay)
        } else {
            Some(self.policy.max_backoff)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Delays<'_> {}

fn positive_secs(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
