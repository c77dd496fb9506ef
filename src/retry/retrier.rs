//! The retry loop.

use std::borrow::Cow;
use std::future::Future;
use std::pin::pin;
use std::time::{Duration, Instant};

use futures::future::{self, Either};
use tracing::{debug, info, warn, Instrument};

use super::error::{Failure, RetryError, RetryExhausted};
use super::jitter::{JitterSource, ThreadRngJitter};
use super::policy::{RetryEvent, RetryPolicy};
use super::sleep::{BlockingSleeper, Sleeper, SystemSleeper};
use super::state::RetryState;

/// Executes operations under a [`RetryPolicy`].
///
/// The retrier owns the policy, a [`JitterSource`] and a sleeper. It holds no
/// per-invocation state: every call to an `execute*` method starts from a
/// fresh [`RetryState`], so one retrier can serve many concurrent callers
/// through a shared reference.
///
/// The first attempt always runs immediately. After each transient failure
/// the retrier waits `2^n` seconds plus jitter (capped at `max_backoff +
/// jitter_max`) and tries again, until the operation succeeds, fails
/// permanently, or the retry budget runs out.
///
/// Elapsed times reported through [`RetryEvent::elapsed`] and
/// [`RetryExhausted::total_duration`] come from [`std::time::Instant`], so
/// they track the wall clock rather than a paused tokio clock.
///
/// # Examples
///
/// ```rust
/// use backwater::testing::RecordingSleeper;
/// use backwater::{BackoffRetrier, Failure, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let policy = RetryPolicy::default().with_max_retries(3);
/// let retrier = BackoffRetrier::new(policy)
///     .with_sleeper(RecordingSleeper::new())
///     .named("fetch_data");
///
/// let mut calls = 0;
/// let result = retrier
///     .execute(|| {
///         calls += 1;
///         let outcome = if calls < 3 {
///             Err(Failure::transient("connection refused"))
///         } else {
///             Ok("payload")
///         };
///         async move { outcome }
///     })
///     .await;
///
/// assert_eq!(result, Ok("payload"));
/// assert_eq!(calls, 3);
/// assert!(retrier.sleeper().total() >= Duration::from_secs(3));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct BackoffRetrier<J = ThreadRngJitter, S = SystemSleeper> {
    policy: RetryPolicy,
    jitter: J,
    sleeper: S,
    name: Option<Cow<'static, str>>,
}

impl BackoffRetrier {
    /// Create a retrier using thread-local jitter and the real clock.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            jitter: ThreadRngJitter,
            sleeper: SystemSleeper,
            name: None,
        }
    }
}

impl Default for BackoffRetrier {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl<J, S> BackoffRetrier<J, S> {
    /// Replace the jitter source.
    pub fn with_jitter<J2: JitterSource>(self, jitter: J2) -> BackoffRetrier<J2, S> {
        BackoffRetrier {
            policy: self.policy,
            jitter,
            sleeper: self.sleeper,
            name: self.name,
        }
    }

    /// Replace the sleeper.
    pub fn with_sleeper<S2>(self, sleeper: S2) -> BackoffRetrier<J, S2> {
        BackoffRetrier {
            policy: self.policy,
            jitter: self.jitter,
            sleeper,
            name: self.name,
        }
    }

    /// Name the retried operation.
    ///
    /// The name is attached to the `retry` tracing span and to
    /// [`RetryExhausted::operation`].
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The policy this retrier executes.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The jitter source.
    pub fn jitter(&self) -> &J {
        &self.jitter
    }

    /// The sleeper.
    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// The operation name, if set.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn span(&self) -> tracing::Span {
        tracing::debug_span!("retry", operation = self.name().unwrap_or("anonymous"))
    }

    fn exhausted<E>(&self, error: E, attempts: u32, elapsed: Duration) -> RetryError<E> {
        warn!(attempts, elapsed = ?elapsed, "retries exhausted");
        let mut exhausted = RetryExhausted::new(error, attempts, elapsed);
        exhausted.operation = self.name.clone();
        RetryError::Exhausted(exhausted)
    }
}

impl<J: JitterSource, S: Sleeper> BackoffRetrier<J, S> {
    /// Run `operation` until it succeeds, fails permanently, or exhausts the
    /// policy.
    ///
    /// `operation` is called once per attempt and must produce a fresh
    /// future each time.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure<E>>>,
    {
        self.run(operation, |_: &RetryEvent<'_, E>| {}, future::pending::<()>())
            .await
    }

    /// Like [`execute`](Self::execute), calling `on_retry` after every
    /// transient failure.
    ///
    /// The hook runs synchronously before the wait begins and should not
    /// block. On the terminal failure it sees `next_delay == None`.
    ///
    /// ```rust
    /// use backwater::{BackoffRetrier, Failure, RetryEvent, RetryPolicy};
    /// use backwater::testing::RecordingSleeper;
    /// use std::cell::RefCell;
    ///
    /// # tokio_test::block_on(async {
    /// let retrier = BackoffRetrier::new(RetryPolicy::default().with_max_retries(2))
    ///     .with_sleeper(RecordingSleeper::new());
    /// let events = RefCell::new(Vec::new());
    ///
    /// let _ = retrier
    ///     .execute_with_hooks(
    ///         || async { Err::<(), _>(Failure::transient("refused")) },
    ///         |event: &RetryEvent<'_, &str>| {
    ///             events.borrow_mut().push((event.attempt, event.next_delay.is_some()));
    ///         },
    ///     )
    ///     .await;
    ///
    /// assert_eq!(events.into_inner(), vec![(1, true), (2, true), (3, false)]);
    /// # });
    /// ```
    pub async fn execute_with_hooks<T, E, F, Fut, H>(
        &self,
        operation: F,
        on_retry: H,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure<E>>>,
        H: Fn(&RetryEvent<'_, E>),
    {
        self.run(operation, on_retry, future::pending::<()>()).await
    }

    /// Like [`execute`](Self::execute), aborting if `cancel` completes while
    /// waiting between attempts.
    ///
    /// `cancel` is only raced against the waits: an attempt that has already
    /// started runs to completion, and once `cancel` fires the operation is
    /// not invoked again. The result is then [`RetryError::Cancelled`].
    ///
    /// `cancel` is polled before every retry, even when the wait is zero,
    /// and takes priority over a wait that finishes at the same moment.
    pub async fn execute_until<T, E, F, Fut, C>(
        &self,
        operation: F,
        cancel: C,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure<E>>>,
        C: Future<Output = ()>,
    {
        self.run(operation, |_: &RetryEvent<'_, E>| {}, cancel).await
    }

    /// Like [`execute_until`](Self::execute_until) with a timer as the
    /// cancel signal.
    ///
    /// The deadline is measured from the call and is only checked during
    /// waits, so an expired deadline is reported as
    /// [`RetryError::Cancelled`] and never mistaken for a transient failure.
    #[cfg(feature = "async")]
    pub async fn execute_with_deadline<T, E, F, Fut>(
        &self,
        operation: F,
        deadline: Duration,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure<E>>>,
    {
        self.execute_until(operation, tokio::time::sleep(deadline))
            .await
    }

    async fn run<T, E, F, Fut, H, C>(
        &self,
        mut operation: F,
        on_retry: H,
        cancel: C,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Failure<E>>>,
        H: Fn(&RetryEvent<'_, E>),
        C: Future<Output = ()>,
    {
        let span = self.span();
        async move {
            let start = Instant::now();
            let mut state = RetryState::new();
            let mut cancel = pin!(cancel);

            loop {
                let delay = state.current_delay();
                debug!(attempt = state.attempt() + 1, delay = ?delay, "attempting operation");

                if state.attempt() > 0 {
                    let sleep = pin!(self.sleeper.sleep(delay));
                    if let Either::Left(_) = future::select(cancel.as_mut(), sleep).await {
                        info!(attempts = state.attempt(), "retry cancelled while waiting");
                        return Err(RetryError::Cancelled {
                            attempts: state.attempt(),
                        });
                    }
                }

                match operation().await {
                    Ok(value) => return Ok(value),
                    Err(Failure::Permanent(error)) => {
                        debug!(attempt = state.attempt() + 1, "permanent failure, not retrying");
                        return Err(RetryError::Permanent(error));
                    }
                    Err(Failure::Transient(error)) => {
                        let next_delay = state.record_failure(&self.policy, &self.jitter);
                        on_retry(&RetryEvent {
                            attempt: state.attempt(),
                            error: &error,
                            next_delay,
                            elapsed: start.elapsed(),
                        });
                        if next_delay.is_none() {
                            return Err(self.exhausted(error, state.attempt(), start.elapsed()));
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl<J: JitterSource, S: BlockingSleeper> BackoffRetrier<J, S> {
    /// Run a synchronous `operation`, blocking the thread between attempts.
    ///
    /// ```rust
    /// use backwater::{BackoffRetrier, Failure, RetryPolicy};
    /// use backwater::testing::RecordingSleeper;
    ///
    /// let retrier = BackoffRetrier::new(RetryPolicy::default())
    ///     .with_sleeper(RecordingSleeper::new());
    ///
    /// let result = retrier.execute_blocking(|| Err::<(), _>(Failure::permanent("bad request")));
    /// assert!(result.unwrap_err().is_permanent());
    /// assert!(retrier.sleeper().delays().is_empty());
    /// ```
    pub fn execute_blocking<T, E, F>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, Failure<E>>,
    {
        self.execute_blocking_with_hooks(operation, |_: &RetryEvent<'_, E>| {})
    }

    /// Blocking counterpart of
    /// [`execute_with_hooks`](Self::execute_with_hooks).
    pub fn execute_blocking_with_hooks<T, E, F, H>(
        &self,
        mut operation: F,
        on_retry: H,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, Failure<E>>,
        H: Fn(&RetryEvent<'_, E>),
    {
        let span = self.span();
        let _entered = span.enter();
        let start = Instant::now();
        let mut state = RetryState::new();

        loop {
            let delay = state.current_delay();
            debug!(attempt = state.attempt() + 1, delay = ?delay, "attempting operation");
            if state.attempt() > 0 {
                self.sleeper.sleep_blocking(delay);
            }

            match operation() {
                Ok(value) => return Ok(value),
                Err(Failure::Permanent(error)) => {
                    debug!(attempt = state.attempt() + 1, "permanent failure, not retrying");
                    return Err(RetryError::Permanent(error));
                }
                Err(Failure::Transient(error)) => {
                    let next_delay = state.record_failure(&self.policy, &self.jitter);
                    on_retry(&RetryEvent {
                        attempt: state.attempt(),
                        error: &error,
                        next_delay,
                        elapsed: start.elapsed(),
                    });
                    if next_delay.is_none() {
                        return Err(self.exhausted(error, state.attempt(), start.elapsed()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::jitter::NoJitter;
    use crate::testing::{RecordingSleeper, ScriptedJitter};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tracing_test::traced_test;

    fn policy_with_retries(max_retries: u32) -> RetryPolicy {
        RetryPolicy::default().with_max_retries(max_retries)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_never_sleeps() {
        let retrier = BackoffRetrier::new(policy_with_retries(3)).with_sleeper(RecordingSleeper::new());

        let result = retrier.execute(|| async { Ok::<_, Failure<()>>(42) }).await;

        assert_eq!(result, Ok(42));
        assert!(retrier.sleeper().delays().is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts_and_name() {
        let retrier = BackoffRetrier::new(policy_with_retries(2))
            .with_sleeper(RecordingSleeper::new())
            .named("fetch_data");

        let err = retrier
            .execute(|| async { Err::<(), _>(Failure::transient("refused")) })
            .await
            .unwrap_err();

        match err {
            RetryError::Exhausted(exhausted) => {
                assert_eq!(exhausted.attempts, 3);
                assert_eq!(exhausted.final_error, "refused");
                assert_eq!(exhausted.operation.as_deref(), Some("fetch_data"));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delays_follow_schedule_plus_jitter() {
        let retrier = BackoffRetrier::new(policy_with_retries(5).with_max_backoff(Duration::from_secs(4)))
            .with_jitter(ScriptedJitter::constant(Duration::from_millis(500)))
            .with_sleeper(RecordingSleeper::new());

        let _ = retrier
            .execute(|| async { Err::<(), _>(Failure::transient(())) })
            .await;

        let millis: Vec<u128> = retrier
            .sleeper()
            .delays()
            .iter()
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(millis, vec![1500, 2500, 4500, 4500, 4500]);
    }

    #[tokio::test]
    async fn test_cancel_during_wait_stops_invocations() {
        let calls = AtomicU32::new(0);
        let retrier = BackoffRetrier::new(policy_with_retries(5))
            .with_jitter(NoJitter)
            .with_sleeper(RecordingSleeper::never_wakes());

        let result = retrier
            .execute_until(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(Failure::transient("down")) }
                },
                async {},
            )
            .await;

        assert_eq!(result, Err(RetryError::Cancelled { attempts: 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_is_honored_when_the_wait_is_zero() {
        let calls = AtomicU32::new(0);
        let retrier = BackoffRetrier::new(policy_with_retries(5).with_max_backoff(Duration::ZERO))
            .with_jitter(NoJitter)
            .with_sleeper(RecordingSleeper::new());

        let result = retrier
            .execute_until(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(Failure::transient("down")) }
                },
                future::ready(()),
            )
            .await;

        assert_eq!(result, Err(RetryError::Cancelled { attempts: 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "async")]
    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_not_a_transient_failure() {
        let calls = AtomicU32::new(0);
        let retrier = BackoffRetrier::new(policy_with_retries(10)).with_jitter(NoJitter);

        let result = retrier
            .execute_with_deadline(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(Failure::transient("down")) }
                },
                Duration::from_secs(5),
            )
            .await;

        // Waits of 1s and 2s fit inside the deadline, the 4s wait does not.
        assert_eq!(result, Err(RetryError::Cancelled { attempts: 3 }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_blocking_matches_async_schedule() {
        let retrier = BackoffRetrier::new(policy_with_retries(4))
            .with_jitter(NoJitter)
            .with_sleeper(RecordingSleeper::new());

        let err = retrier
            .execute_blocking(|| Err::<(), _>(Failure::transient("refused")))
            .unwrap_err();

        assert!(err.is_exhausted());
        assert_eq!(
            retrier.sleeper().delays(),
            [1, 2, 4, 8].map(Duration::from_secs).to_vec()
        );
    }

    #[test]
    fn test_blocking_hooks_see_every_failure() {
        let retrier = BackoffRetrier::new(policy_with_retries(1)).with_sleeper(RecordingSleeper::new());
        let seen = AtomicU32::new(0);

        let _ = retrier.execute_blocking_with_hooks(
            || Err::<(), _>(Failure::transient("refused")),
            |event: &RetryEvent<'_, &str>| {
                assert_eq!(*event.error, "refused");
                seen.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[traced_test]
    fn test_each_attempt_is_logged_with_delay() {
        let retrier = BackoffRetrier::new(policy_with_retries(2))
            .with_jitter(NoJitter)
            .with_sleeper(RecordingSleeper::new())
            .named("fetch_data");

        let _ = retrier.execute_blocking(|| Err::<(), _>(Failure::transient("refused")));

        assert!(logs_contain("attempt=1 delay=0ns"));
        assert!(logs_contain("attempt=2 delay=1s"));
        assert!(logs_contain("attempt=3 delay=2s"));
        assert!(logs_contain("retries exhausted"));
        assert!(logs_contain("fetch_data"));
    }
}
