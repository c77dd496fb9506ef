//! Error types for retry operations.

use std::borrow::Cow;
use std::time::Duration;

/// The outcome of a single failed attempt, as reported by the operation.
///
/// The retrier only knows one kind of recoverable failure: an operation
/// returns [`Failure::Transient`] when trying again later may succeed, and
/// [`Failure::Permanent`] for everything else. Permanent failures are never
/// retried.
///
/// # Examples
///
/// ```rust
/// use backwater::Failure;
///
/// fn classify(status: u16) -> Failure<u16> {
///     if status >= 500 {
///         Failure::transient(status)
///     } else {
///         Failure::permanent(status)
///     }
/// }
///
/// assert!(classify(503).is_transient());
/// assert!(!classify(404).is_transient());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure<E> {
    /// A recoverable failure; the retrier backs off and tries again.
    Transient(E),
    /// Any other failure; propagated to the caller immediately.
    Permanent(E),
}

impl<E> Failure<E> {
    /// Create a transient failure.
    pub fn transient(error: E) -> Self {
        Self::Transient(error)
    }

    /// Create a permanent failure.
    pub fn permanent(error: E) -> Self {
        Self::Permanent(error)
    }

    /// Returns true if this failure should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Get a reference to the underlying error.
    pub fn error(&self) -> &E {
        match self {
            Self::Transient(e) | Self::Permanent(e) => e,
        }
    }

    /// Extract the underlying error, discarding the classification.
    pub fn into_error(self) -> E {
        match self {
            Self::Transient(e) | Self::Permanent(e) => e,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(e) => write!(f, "transient failure: {}", e),
            Self::Permanent(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Failure<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error())
    }
}

/// Error returned when all retry attempts are exhausted.
///
/// Contains the error from the final attempt along with metadata about the
/// retry sequence.
///
/// # Examples
///
/// ```rust
/// use backwater::{BackoffRetrier, Failure, RetryError, RetryPolicy};
/// use backwater::testing::RecordingSleeper;
///
/// let retrier = BackoffRetrier::new(RetryPolicy::default().with_max_retries(2))
///     .with_sleeper(RecordingSleeper::new())
///     .named("fetch_data");
///
/// match retrier.execute_blocking(|| Err::<(), _>(Failure::transient("refused"))) {
///     Err(RetryError::Exhausted(exhausted)) => {
///         assert_eq!(exhausted.final_error, "refused");
///         assert_eq!(exhausted.attempts, 3); // 1 initial + 2 retries
///         assert_eq!(exhausted.operation.as_deref(), Some("fetch_data"));
///     }
///     other => panic!("Expected exhaustion, got {:?}", other),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    /// The error from the final attempt.
    pub final_error: E,
    /// Total number of attempts made (initial + retries).
    pub attempts: u32,
    /// Total time spent retrying.
    ///
    /// This is wall-clock time from [`std::time::Instant`]; a paused tokio
    /// clock does not affect it.
    pub total_duration: Duration,
    /// Name of the retried operation, if the retrier was named.
    pub operation: Option<Cow<'static, str>>,
}

impl<E> RetryExhausted<E> {
    /// Create a new RetryExhausted error.
    pub fn new(final_error: E, attempts: u32, total_duration: Duration) -> Self {
        Self {
            final_error,
            attempts,
            total_duration,
            operation: None,
        }
    }

    /// Attach the name of the operation that was retried.
    pub fn with_operation(mut self, operation: impl Into<Cow<'static, str>>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Extract the final error, discarding metadata.
    pub fn into_error(self) -> E {
        self.final_error
    }

    /// Get a reference to the final error.
    pub fn error(&self) -> &E {
        &self.final_error
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.operation {
            Some(op) => write!(
                f,
                "{} exhausted retries after {} attempts ({:?}): {}",
                op, self.attempts, self.total_duration, self.final_error
            ),
            None => write!(
                f,
                "retry exhausted after {} attempts ({:?}): {}",
                self.attempts, self.total_duration, self.final_error
            ),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.final_error)
    }
}

/// Terminal failure of a retried operation.
///
/// A caller sees exactly one of these per invocation, never the intermediate
/// transient failures that were absorbed along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every permitted attempt failed transiently.
    Exhausted(RetryExhausted<E>),
    /// The operation reported a permanent failure; it is returned unchanged.
    Permanent(E),
    /// The cancel signal fired while waiting between attempts.
    Cancelled {
        /// Attempts made before cancellation.
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Returns true if the retry budget was used up.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }

    /// Returns true if the operation failed permanently.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Returns true if the loop was cancelled during a wait.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The operation's error, if there is one.
    ///
    /// Cancellation carries no operation error and yields `None`.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Exhausted(exhausted) => Some(exhausted.final_error),
            Self::Permanent(e) => Some(e),
            Self::Cancelled { .. } => None,
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted(exhausted) => write!(f, "{}", exhausted),
            Self::Permanent(e) => write!(f, "{}", e),
            Self::Cancelled { attempts } => {
                write!(f, "retry cancelled after {} attempts", attempts)
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Exhausted(exhausted) => Some(exhausted),
            Self::Permanent(e) => Some(e),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Error returned when a retry policy is misconfigured.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// `max_backoff` must be a positive, finite number of seconds.
    InvalidMaxBackoff(f64),
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMaxBackoff(secs) => {
                write!(f, "max_backoff must be positive and finite, got {}s", secs)
            }
        }
    }
}

impl std::error::Error for PolicyError {}
