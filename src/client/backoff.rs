//! Reconnect scheduling policy.

use std::time::Duration;

use rand::Rng;

/// Linear backoff with an attempt cap and optional jitter.
///
/// The n-th consecutive failure waits `n × base_delay`, plus up to
/// `jitter × that` extra when `jitter > 0`. Once `max_attempts` consecutive
/// closes have happened without a successful open, the manager gives up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay unit multiplied by the attempt number.
    pub base_delay: Duration,
    /// Consecutive closes tolerated before giving up.
    pub max_attempts: u32,
    /// Random extra delay as a fraction of the computed delay, `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(3_000),
            max_attempts: 5,
            jitter: 0.0,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(attempt.max(1));
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.0..=jitter);
        delay.saturating_add(delay.mul_f64(factor))
    }

    /// Whether `failures` consecutive closes exhaust the policy.
    #[must_use]
    pub const fn is_exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}
