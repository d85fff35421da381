//! Exponential backoff policy for reconnect scheduling.

use std::time::Duration;

/// Pure exponential backoff: `delay = min(base × decay^attempts, max)`.
///
/// Holds no mutable state; the attempt counter lives with the connection
/// task that schedules retries.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    decay: f64,
}

impl BackoffPolicy {
    /// Create a policy from configured bounds.
    pub fn new(base: Duration, max: Duration, decay: f64) -> Self {
        Self { base, max, decay }
    }

    /// Delay before the retry following `attempts` prior failures.
    ///
    /// Attempt 0 yields the base delay.
    pub fn delay(&self, attempts: u32) -> Duration {
        let exp = self.base.as_millis() as f64 * self.decay.powi(attempts.min(i32::MAX as u32) as i32);
        let capped = exp.min(self.max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 2.0)
    }

    #[test]
    fn test_first_delay_is_base() {
        assert_eq!(policy().delay(0), Duration::from_secs(1));
    }

    #[test]
    fn test_delay_grows_by_decay() {
        let p = policy();
        assert_eq!(p.delay(1), Duration::from_secs(2));
        assert_eq!(p.delay(2), Duration::from_secs(4));
        assert_eq!(p.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let p = policy();
        assert_eq!(p.delay(10), Duration::from_secs(30));
        assert_eq!(p.delay(63), Duration::from_secs(30));
    }

    #[test]
    fn test_large_attempt_count_does_not_overflow() {
        let p = policy();
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_fractional_decay() {
        let p = BackoffPolicy::new(Duration::from_millis(500), Duration::from_secs(10), 1.5);
        assert_eq!(p.delay(0), Duration::from_millis(500));
        assert_eq!(p.delay(1), Duration::from_millis(750));
        assert_eq!(p.delay(2), Duration::from_millis(1125));
    }
}
