// ── Reconnect backoff ──
//
// Pure function of the retry count: no clock, no jitter. Delays double
// from `initial_delay` until they hit `max_delay`.

use std::time::Duration;

/// Verdict for the next reconnect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Wait this long, then try again.
    After(Duration),
    /// The budget is spent; the channel should go to `Failed`.
    GiveUp,
}

/// Exponential backoff for push channel reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Reconnect attempts allowed after the first failure. Default: 5.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// `min(initial · 2^retries, max)`. Saturates instead of overflowing.
    pub fn next_delay(&self, retries: u32) -> Duration {
        let factor = 1u32.checked_shl(retries).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Decide what to do after `retries` reconnect attempts have already
    /// been made for the current outage.
    pub fn decide(&self, retries: u32) -> Retry {
        if retries >= self.max_attempts {
            Retry::GiveUp
        } else {
            Retry::After(self.next_delay(retries))
        }
    }
}
