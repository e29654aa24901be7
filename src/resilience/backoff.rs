//! Reconnect backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Exponential delay schedule for repeated connect attempts.
///
/// Each call to `next_delay` doubles the previous delay up to `max`, plus up
/// to 10% jitter so workers reconnecting to the same sink spread out.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max: max.max(base), attempt: 0 }
    }

    /// Number of delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);

        let factor = 2u32.saturating_pow(self.attempt - 1);
        let capped = self.base.saturating_mul(factor).min(self.max);

        let jitter_ms = (capped.as_millis() / 10) as u64;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..jitter_ms)
        } else {
            0
        };

        capped + Duration::from_millis(jitter)
    }

    /// Start over after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
