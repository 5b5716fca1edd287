//! # Controller Configuration
//!
//! Reconcile tuning loaded from environment variables.

use super::env_var_or_default;
use crate::constants::{
    DEFAULT_CONCURRENCY, DEFAULT_CONFLICT_RETRY_ATTEMPTS, DEFAULT_CONFLICT_RETRY_BACKOFF_MS,
    DEFAULT_ERROR_BACKOFF_MAX_SECS, DEFAULT_ERROR_BACKOFF_MIN_SECS, DEFAULT_RESYNC_PERIOD_SECS,
};
use crate::controller::retry::RetryPolicy;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of `Puller` objects reconciled in parallel
    pub concurrency: u16,
    /// Attempts per fetch-modify-write cycle before a conflict is surfaced
    pub conflict_retry_attempts: u32,
    /// Pause between conflict retries (milliseconds)
    pub conflict_retry_backoff_ms: u64,
    /// Requeue interval after a successful reconcile (seconds)
    pub resync_period_secs: u64,
    /// Error backoff floor (seconds)
    pub error_backoff_min_secs: u64,
    /// Error backoff ceiling (seconds)
    pub error_backoff_max_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            conflict_retry_attempts: DEFAULT_CONFLICT_RETRY_ATTEMPTS,
            conflict_retry_backoff_ms: DEFAULT_CONFLICT_RETRY_BACKOFF_MS,
            resync_period_secs: DEFAULT_RESYNC_PERIOD_SECS,
            error_backoff_min_secs: DEFAULT_ERROR_BACKOFF_MIN_SECS,
            error_backoff_max_secs: DEFAULT_ERROR_BACKOFF_MAX_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            concurrency: env_var_or_default("CONCURRENCY", DEFAULT_CONCURRENCY),
            conflict_retry_attempts: env_var_or_default(
                "CONFLICT_RETRY_ATTEMPTS",
                DEFAULT_CONFLICT_RETRY_ATTEMPTS,
            ),
            conflict_retry_backoff_ms: env_var_or_default(
                "CONFLICT_RETRY_BACKOFF_MS",
                DEFAULT_CONFLICT_RETRY_BACKOFF_MS,
            ),
            resync_period_secs: env_var_or_default(
                "RESYNC_PERIOD_SECS",
                DEFAULT_RESYNC_PERIOD_SECS,
            ),
            error_backoff_min_secs: env_var_or_default(
                "ERROR_BACKOFF_MIN_SECS",
                DEFAULT_ERROR_BACKOFF_MIN_SECS,
            ),
            error_backoff_max_secs: env_var_or_default(
                "ERROR_BACKOFF_MAX_SECS",
                DEFAULT_ERROR_BACKOFF_MAX_SECS,
            ),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.conflict_retry_attempts,
            backoff: Duration::from_millis(self.conflict_retry_backoff_ms),
        }
    }

    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_client_retry_budget() {
        let config = ControllerConfig::default();
        let policy = config.retry_policy();
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.backoff, Duration::from_millis(10));
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.resync_period(), Duration::from_secs(600));
    }
}
