//! Exponential retry delay.

use std::time::Duration;

/// Doubling delay between `initial` and `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following one doubles, up to `max`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(2)
            .map_or(self.max, |next| next.min(self.max));
        delay
    }

    /// Start again from the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
