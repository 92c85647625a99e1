//! Retry policy for failed tasks

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry ladder applied by the worker loop to failed tasks.
///
/// The delay before retry `n` (zero-based) is
/// `base_delay * backoff^n`.
///
/// # Example
///
/// ```
/// use lightemporal::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default()
///     .with_max_retries(3)
///     .with_base_delay(Duration::from_secs(1))
///     .with_backoff(2.0);
///
/// // First retry after 1 second, second after 2, third after 4
/// assert_eq!(policy.delay_for_retry(1), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,

    /// Multiplier applied per retry (1.0 keeps the delay fixed)
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay: Duration::ZERO,
            backoff: 1.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_backoff(mut self, backoff: f64) -> Self {
        self.backoff = backoff.max(1.0);
        self
    }

    /// Whether a task that already failed `retry_count` times gets
    /// another attempt
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay before retry number `retry_count` (zero-based)
    pub fn delay_for_retry(&self, retry_count: u32) -> Duration {
        Duration::from_secs_f64(
            self.base_delay.as_secs_f64() * self.backoff.powi(retry_count as i32),
        )
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_retry_everything_immediately() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 10);
        assert_eq!(policy.delay_for_retry(0), Duration::ZERO);
        assert_eq!(policy.delay_for_retry(9), Duration::ZERO);
        assert!(policy.should_retry(9));
        assert!(!policy.should_retry(10));
    }

    #[test]
    fn test_exponential_ladder() {
        let policy = RetryPolicy::default()
            .with_max_retries(3)
            .with_base_delay(Duration::from_secs(1))
            .with_backoff(2.0);

        assert_eq!(policy.delay_for_retry(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_retry(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_retry(2), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_below_one_is_clamped()  {
        let policy = RetryPolicy::default()
            .with_base_delay(Duration::from_secs(1))
            .with_backoff(0.5);

        assert_eq!(policy.delay_for_retry(3), Duration::from_secs(1));
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert!(!policy.should_retry(0));
    }

    #[test]
    fn test_serialization_round_trip() {
        let policy = RetryPolicy::default()
            .with_max_retries(5)
            .with_base_delay(Duration::from_millis(250));

        let json = serde_json::to_string(&policy).unwrap();
        let parsed: RetryPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, parsed);
    }
}
