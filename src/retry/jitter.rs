//! Sources of randomness for jitter.
//!
//! Jitter desynchronizes clients that start retrying at the same moment
//! (for example after a shared outage). Every wait draws a fresh sample, so a
//! source is consulted once per retry, never once per policy.

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Produces the random component of a backoff delay.
///
/// Implementations must return a value in `[0, max]`; the retrier clamps
/// anything larger.
pub trait JitterSource {
    /// Draw one jitter sample bounded by `max`.
    fn sample(&self, max: Duration) -> Duration;
}

/// Uniform jitter from the thread-local RNG, in whole milliseconds.
///
/// This is the default source. It holds no state, so a retrier using it can
/// be shared across threads and tasks without locking.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn sample(&self, max: Duration) -> Duration {
        uniform_millis(&mut rand::rng(), max)
    }
}

/// Uniform jitter from a seeded RNG.
///
/// Two sources built from the same seed produce the same sequence, which
/// makes delay schedules reproducible.
///
/// ```rust
/// use backwater::{JitterSource, SeededJitter};
/// use std::time::Duration;
///
/// let a = SeededJitter::new(7);
/// let b = SeededJitter::new(7);
/// let max = Duration::from_millis(1000);
///
/// for _ in 0..10 {
///     assert_eq!(a.sample(max), b.sample(max));
/// }
/// ```
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    /// Create a source seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl JitterSource for SeededJitter {
    fn sample(&self, max: Duration) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        uniform_millis(&mut *rng, max)
    }
}

/// A source that never adds jitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn sample(&self, _max: Duration) -> Duration {
        Duration::ZERO
    }
}

impl<J: JitterSource + ?Sized> JitterSource for &J {
    fn sample(&self, max: Duration) -> Duration {
        (**self).sample(max)
    }
}

impl<J: JitterSource + ?Sized> JitterSource for std::sync::Arc<J> {
    fn sample(&self, max: Duration) -> Duration {
        (**self).sample(max)
    }
}

fn uniform_millis<R: Rng + ?Sized>(rng: &mut R, max: Duration) -> Duration {
    let max_millis = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_millis == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(rng.random_range(0..=max_millis))
    }
}
