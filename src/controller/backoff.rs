//! # Exponential Backoff
//!
//! Per-resource retry delays for failed reconciliations. Each failure doubles
//! the delay, starting from a configured minimum and capped at a maximum. A
//! successful reconciliation resets the sequence.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use vault_config_controller::controller::backoff::ExponentialBackoff;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(8));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
//! ```

use std::time::Duration;

/// Exponential backoff calculator
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// First delay handed out, and the value restored by `reset`
    min: Duration,
    /// Delay returned by the next call
    current: Duration,
    /// Upper bound for every delay
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a backoff starting at `min` and never exceeding `max`
    ///
    /// A `max` below `min` is raised to `min`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            current: min,
            max,
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}
