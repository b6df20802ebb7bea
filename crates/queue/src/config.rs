//! Queue configuration.

use std::time::Duration;

use serde::Deserialize;

/// Tuning knobs for the queue runtime.
///
/// `max_attempts` is stamped onto each job at enqueue time; changing it
/// later only affects jobs enqueued afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    /// Jobs claimed per dispatch cycle.
    pub batch_size: usize,
    /// Attempt budget stamped onto new jobs.
    pub max_attempts: u32,
    /// Base of the exponential backoff (delay after the first failure).
    #[serde(with = "humantime_serde")]
    pub base_retry_delay: Duration,
    /// How long terminal jobs are kept before the janitor purges them.
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
    /// Age of `started_at` beyond which a processing job is presumed
    /// abandoned by a dead worker.
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_attempts: 3,
            base_retry_delay: Duration::from_secs(60),
            retention: Duration::from_secs(30 * 24 * 60 * 60),
            lock_timeout: Duration::from_secs(300),
        }
    }
}

impl QueueConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay = delay;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = QueueConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_retry_delay, Duration::from_secs(60));
        assert_eq!(config.retention, Duration::from_secs(30 * 24 * 60 * 60));
        assert_eq!(config.lock_timeout, Duration::from_secs(300));
    }

    #[test]
    fn deserializes_humantime_durations() {
        let config: QueueConfig = serde_json::from_str(
            r#"{"batch_size": 25, "base_retry_delay": "90s", "retention": "7d"}"#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.base_retry_delay, Duration::from_secs(90));
        assert_eq!(config.retention, Duration::from_secs(7 * 24 * 60 * 60));
        // Unspecified fields keep their defaults.
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<QueueConfig>(r#"{"batch_sizes": 5}"#).is_err());
    }
}
