//! # Backwater
//!
//! > *Calm waters after the storm*
//!
//! A Rust library for retrying transient failures with exponential backoff
//! and jitter.
//!
//! ## Philosophy
//!
//! **Backwater** keeps the retry policy pure and pushes the side effects to
//! the edges:
//! - **Policy** = data (how many retries, how long to wait, how much noise)
//! - **Retrier** = the loop that runs an operation under a policy, sleeping
//!   and sampling randomness through swappable capabilities
//!
//! ## Quick Example
//!
//! ```rust
//! use backwater::testing::RecordingSleeper;
//! use backwater::{BackoffRetrier, Failure, RetryPolicy};
//! use std::time::Duration;
//!
//! fn fetch(attempt: u32) -> Result<&'static str, Failure<String>> {
//!     if attempt < 2 {
//!         Err(Failure::transient(format!("connection refused (attempt {})", attempt)))
//!     } else {
//!         Ok("<html>...</html>")
//!     }
//! }
//!
//! let policy = RetryPolicy::default().with_jitter_max(Duration::ZERO);
//!
//! let retrier = BackoffRetrier::new(policy)
//!     .with_sleeper(RecordingSleeper::new())
//!     .named("fetch_data");
//! let mut attempt = 0;
//! let body = retrier.execute_blocking(|| {
//!     let result = fetch(attempt);
//!     attempt += 1;
//!     result
//! });
//!
//! assert_eq!(body, Ok("<html>...</html>"));
//! assert_eq!(
//!     retrier.sleeper().delays(),
//!     vec![Duration::from_secs(1), Duration::from_secs(2)]
//! );
//! ```
//!
//! For a runnable program, see `demos/flaky_fetch.rs`.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod retry;
pub mod testing;

// Re-exports
pub use retry::{
    BackoffRetrier, BlockingSleeper, Failure, JitterSource, NoJitter, PolicyError, RetryError,
    RetryEvent, RetryExhausted, RetryPolicy, RetryState, SeededJitter, Sleeper, SystemSleeper,
    ThreadRngJitter,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::retry::{BackoffRetrier, Failure, RetryError, RetryExhausted, RetryPolicy};
}
