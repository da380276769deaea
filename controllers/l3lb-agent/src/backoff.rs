//! # Fixed Backoff
//!
//! Reconnect delay for watch supervisors. The delay never grows: persistent
//! API unavailability produces a steady cadence of logged retries instead of
//! ever-longer silences.

use std::time::Duration;

/// Fixed-interval backoff that counts consecutive failures
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    /// Delay returned for every failure
    interval: Duration,
    /// Failures since the last reset
    consecutive_failures: u32,
}

impl FixedBackoff {
    /// Create a backoff with the given interval
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            consecutive_failures: 0,
        }
    }

    /// Record a failure and return the delay before the next attempt
    pub fn next_backoff(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.interval
    }

    /// Failures recorded since the last reset
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Reset after a successful connection
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }
}
