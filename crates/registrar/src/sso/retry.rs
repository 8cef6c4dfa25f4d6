use std::time::Duration;

use registrar_common::RegistrarError;
use registrar_common::constants::{ATTEMPT_DELAY_MS, MAX_LOGIN_ATTEMPTS, REQUEST_TIMEOUT_SECS};

/// Bounds on automatic login attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Applied to each outbound request
    pub request_timeout: Duration,
    /// Pause between attempts
    pub attempt_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_LOGIN_ATTEMPTS,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            attempt_delay: Duration::from_millis(ATTEMPT_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Attempt numbers, 1-based; always at least one
    pub fn attempts(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.max_attempts.max(1)
    }

    /// Pause before `attempt`; none before the first
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        (attempt > 1 && !self.attempt_delay.is_zero()).then_some(self.attempt_delay)
    }

    /// Whether a failure may be followed by another attempt
    pub fn should_retry(&self, attempt: u32, error: &RegistrarError) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }
}
