//! Exponential backoff for transient watch-loop failures.
//!
//! The delay starts at `initial`, doubles after every consecutive failure up
//! to `max`, and drops back to `initial` on the first success:
//!
//! ```text
//! 1s, 2s, 4s, ... 64s, 64s, ...
//! ```

use std::time::Duration;

use rand::Rng;

/// Default first delay.
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_secs(1);

/// Default delay cap.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(64);

/// Default upper bound of the random jitter added to every sleep.
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_secs(1);

/// Backoff state for one kind of failing action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_MAX)
    }
}

impl Backoff {
    /// Creates a backoff starting at `initial` and capped at `max`.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Records a failure: returns the delay to sleep now and doubles the next one.
    pub fn fail(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Records a success.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// The delay the next failure will sleep.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }
}

/// `delay` plus a uniformly random jitter in `0..=max_jitter`.
#[must_use]
pub fn with_jitter(delay: Duration, max_jitter: Duration) -> Duration {
    let max_ms = u64::try_from(max_jitter.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return delay;
    }
    let jitter_ms = rand::thread_rng().gen_range(0..=max_ms);
    delay + Duration::from_millis(jitter_ms)
}
