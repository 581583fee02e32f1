//! Redelivery policy for unanswered commands.

use std::time::Duration;

/// How long to wait for a reply and how often to re-publish a command.
///
/// Each attempt waits `reply_timeout` for a reply. Between attempts the
/// orchestrator sleeps an exponentially growing backoff capped at
/// `max_backoff`. Once `max_attempts` attempts went unanswered the saga
/// fails with a `timeout` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub reply_timeout: Duration,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Creates a policy without backoff between attempts.
    pub fn new(max_attempts: u32, reply_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            reply_timeout,
            backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration, max_backoff: Duration) -> Self {
        self.backoff = backoff;
        self.max_backoff = max_backoff.max(backoff);
        self
    }

    /// Returns true if another attempt may follow `attempt`.
    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before publishing `attempt` (1-based). The first attempt is immediate.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.backoff.is_zero() {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        self.backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }

    /// Upper bound on the time between start and the timeout verdict.
    pub fn total_budget(&self) -> Duration {
        (1..=self.max_attempts)
            .map(|attempt| self.delay_before(attempt) + self.reply_timeout)
            .sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
            .with_backoff(Duration::from_millis(200), Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_retry() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert!(policy.can_retry(1));
        assert!(policy.can_retry(2));
        assert!(!policy.can_retry(3));
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).max_attempts, 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1))
            .with_backoff(Duration::from_millis(100), Duration::from_millis(300));
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(100));
        assert_eq!(policy.delay_before(3), Duration::from_millis(200));
        assert_eq!(policy.delay_before(4), Duration::from_millis(300));
    }

    #[test]
    fn test_total_budget() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1))
            .with_backoff(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(policy.total_budget(), Duration::from_millis(3300));
    }
}
