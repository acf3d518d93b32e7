//! In-memory consecutive-failure counters keyed by file or resource id.
//!
//! Counters are process-local; a restart starts every task from zero.

use std::collections::HashMap;

/// Failures after which a task is marked `error`.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 10;

/// Per-key failure counts with a fixed threshold.
#[derive(Debug, Clone)]
pub struct FailureCounter {
    threshold: u32,
    counts: HashMap<String, u32>,
}

impl Default for FailureCounter {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

impl FailureCounter {
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            counts: HashMap::new(),
        }
    }

    /// Adds one failure for `key`; returns `true` once the threshold is reached.
    pub fn record(&mut self, key: &str) -> bool {
        let count = self.counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count >= self.threshold
    }

    /// Forgets `key`.
    pub fn clear(&mut self, key: &str) {
        self.counts.remove(key);
    }

    /// Current count for `key`.
    #[must_use]
    pub fn count(&self, key: &str) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
