//! Reconnect backoff policy.

use std::time::Duration;

/// Exponential backoff with a multiplicative factor, a cap, and additive
/// uniform jitter.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Cap on the exponential growth.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub factor: f64,
    /// Jitter fraction: up to `base * jitter` is added on top.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            factor: 2.0,
            jitter: 0.1,
        }
    }
}

impl ReconnectPolicy {
    /// The capped exponential delay for a 0-indexed attempt, before jitter.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.powi(attempt.min(i32::MAX as u32) as i32);
        self.min_delay.mul_f64(multiplier).min(self.max_delay)
    }

    /// The delay to sleep before retrying `attempt`, jitter included.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for_attempt(attempt);
        base + base.mul_f64(self.jitter * rand::random::<f64>())
    }
}
