//! Engine configuration

use std::time::Duration;

use crate::reliability::RetryPolicy;

/// Configuration for the approval gate, step retries and storage
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often a waiting execution re-reads its status
    pub poll_interval: Duration,

    /// Time from submission until an undecided execution is rejected
    pub approval_timeout: Duration,

    /// Retry policy applied to every step
    pub retry_policy: RetryPolicy,

    /// Pause before a driver retries a step that exhausted its attempts
    pub stall_retry_interval: Duration,

    /// SQLite URL; `None` selects the in-memory store
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            approval_timeout: Duration::from_secs(3600),
            retry_policy: RetryPolicy::default(),
            stall_retry_interval: Duration::from_secs(30),
            database_url: None,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables
    ///
    /// Unset or unparsable variables keep their defaults:
    /// - `APPROVAL_POLL_INTERVAL_MS` (1000)
    /// - `APPROVAL_TIMEOUT_SECS` (3600)
    /// - `STEP_MAX_ATTEMPTS`, `STEP_INITIAL_INTERVAL_MS`, `STEP_MAX_INTERVAL_MS`,
    ///   `STEP_BACKOFF_COEFFICIENT`, `STEP_JITTER` (see [`RetryPolicy::exponential`])
    /// - `STEP_STALL_RETRY_MS` (30000)
    /// - `DATABASE_URL` (unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut policy = defaults.retry_policy.clone();

        if let Some(n) = env_parse::<u32>("STEP_MAX_ATTEMPTS") {
            policy = policy.with_max_attempts(n);
        }
        if let Some(ms) = env_parse::<u64>("STEP_INITIAL_INTERVAL_MS") {
            policy = policy.with_initial_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = env_parse::<u64>("STEP_MAX_INTERVAL_MS") {
            policy = policy.with_max_interval(Duration::from_millis(ms));
        }
        if let Some(c) = env_parse::<f64>("STEP_BACKOFF_COEFFICIENT") {
            policy = policy.with_backoff_coefficient(c);
        }
        if let Some(j) = env_parse::<f64>("STEP_JITTER") {
            policy = policy.with_jitter(j);
        }

        Self {
            poll_interval: env_parse("APPROVAL_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            approval_timeout: env_parse("APPROVAL_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.approval_timeout),
            retry_policy: policy,
            stall_retry_interval: env_parse("STEP_STALL_RETRY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.stall_retry_interval),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_stall_retry_interval(mut self, interval: Duration) -> Self {
        self.stall_retry_interval = interval;
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.approval_timeout, Duration::from_secs(3600));
        assert_eq!(config.stall_retry_interval, Duration::from_secs(30));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_poll_interval(Duration::from_millis(5))
            .with_approval_timeout(Duration::from_millis(100))
            .with_retry_policy(RetryPolicy::no_retry())
            .with_stall_retry_interval(Duration::from_millis(20))
            .with_database_url("sqlite://signoff.db");

        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.approval_timeout, Duration::from_millis(100));
        assert_eq!(config.retry_policy.max_attempts, 1);
        assert_eq!(config.stall_retry_interval, Duration::from_millis(20));
        assert_eq!(config.database_url.as_deref(), Some("sqlite://signoff.db"));
    }
}
