//! Explicit retry schedule for per-file transfers.

use std::time::Duration;
use vidpipe_core::RetrySettings;

/// Bounded exponential backoff. Attempt numbers are 1-based; the delay
/// before attempt `n` doubles from the base and is capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep before retry attempt `attempt` (so attempt 2 waits
    /// the base delay, attempt 3 twice that, and so on).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }
}
