//! Exponential backoff settings

use std::time::Duration;

/// Retry budget and backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// `base_delay * 2^attempt`, saturating
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::policy::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(3, Duration::from_millis(1000));
    /// assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
    /// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4000));
    /// ```
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}
