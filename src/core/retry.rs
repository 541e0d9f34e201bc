//! Bounded retry with exponential backoff for optimistic writes
//!
//! Conditional writes against a contended slot or wallet can lose their
//! version race. The losing writer re-reads and retries under this policy;
//! once the attempt budget is exhausted the conflict surfaces to the caller
//! as a transient error.

use std::time::Duration;

/// Retry policy shared by all optimistic compare-and-swap loops
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts before a conflict is surfaced
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Cap for the backoff delay
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each retry
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(200),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (zero-based)
    ///
    /// Exponential: `initial_delay * multiplier^attempt`, capped at
    /// `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(millis as u64);
        delay.min(self.max_delay)
    }
}
