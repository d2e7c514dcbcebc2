//! Per-resource exponential backoff.

use std::time::Duration;

/// Doubling delay between `min` and `max`.
///
/// The first failure waits `min`; every further failure doubles the previous
/// delay until `max` is reached. [`Backoff::reset`] returns to the start.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Option<Duration>,
    failures: u32,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            current: None,
            failures: 0,
        }
    }

    /// Record a failure and return the delay before the next attempt.
    pub fn next_failure(&mut self) -> Duration {
        let delay = match self.current {
            None => self.min,
            Some(previous) => previous.saturating_mul(2).min(self.max),
        };
        self.current = Some(delay);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Delay of the last failure, if any since the last reset.
    pub fn current(&self) -> Option<Duration> {
        self.current
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.failures = 0;
    }
}
