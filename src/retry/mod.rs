//! Retry with exponential backoff and jitter.
//!
//! The module separates the pieces of a retry so each can be tested alone:
//!
//! - **Policy**: [`RetryPolicy`] is plain data (how many retries, the backoff
//!   ceiling, the jitter bound)
//! - **State**: [`RetryState`] is the per-invocation state machine that turns
//!   a policy into concrete delays
//! - **Effects**: [`JitterSource`] and [`Sleeper`]/[`BlockingSleeper`] supply
//!   randomness and waiting, and can be swapped for deterministic fakes
//! - **Loop**: [`BackoffRetrier`] drives an operation through all of the above
//!
//! # Quick Start
//!
//! ```rust
//! use backwater::{BackoffRetrier, Failure, RetryError, RetryPolicy};
//! use backwater::testing::RecordingSleeper;
//!
//! # tokio_test::block_on(async {
//! let retrier = BackoffRetrier::new(RetryPolicy::default().with_max_retries(0))
//!     .with_sleeper(RecordingSleeper::new());
//!
//! let result = retrier
//!     .execute(|| async { Err::<(), _>(Failure::transient("connection refused")) })
//!     .await;
//!
//! assert!(matches!(result, Err(RetryError::Exhausted(e)) if e.attempts == 1));
//! # });
//! ```
//!
//! # Schedule
//!
//! With the default policy the waits before retries 1, 2, 3, ... are
//! `1s, 2s, 4s, ..., 64s, 64s, ...`, each plus up to one second of jitter.
//! The first attempt is never delayed.
//!
//! # Error Types
//!
//! - [`Failure`]: what an operation returns to mark a failure transient or permanent
//! - [`RetryError`]: the single terminal failure a caller observes
//! - [`RetryExhausted`]: the final error and metadata once retries run out
//! - [`PolicyError`]: invalid configuration

mod error;
mod jitter;
mod policy;
mod retrier;
#[cfg(feature = "serde")]
mod serde_impl;
mod sleep;
mod state;

pub use error::{Failure, PolicyError, RetryError, RetryExhausted};
pub use jitter::{JitterSource, NoJitter, SeededJitter, ThreadRngJitter};
pub use policy::{
    Delays, RetryEvent, RetryPolicy, DEFAULT_JITTER_MAX, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RETRIES,
};
pub use retrier::BackoffRetrier;
pub use sleep::{BlockingSleeper, Sleeper, SystemSleeper};
pub use state::RetryState;
