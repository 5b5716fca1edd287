//! # Conflict Retry
//!
//! Bounded retry for optimistic-concurrency writes.
//!
//! The operation passed to [`retry_on_conflict`] must refetch, mutate and
//! write on every call so each attempt carries a fresh `resourceVersion`.
//! Only conflicts are retried; any other error is returned immediately.

use crate::constants::{DEFAULT_CONFLICT_RETRY_ATTEMPTS, DEFAULT_CONFLICT_RETRY_BACKOFF_MS};
use crate::observability::metrics;
use crate::store::StoreError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Attempt budget and pause for conflict retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Pause between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_CONFLICT_RETRY_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_CONFLICT_RETRY_BACKOFF_MS),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-conflict error, or the
/// attempt budget is spent; the last error is returned
pub async fn retry_on_conflict<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(error) if error.is_conflict() && attempt < attempts => {
                debug!(attempt, max_attempts = attempts, error = %error, "Write conflict, retrying");
                metrics::increment_conflict_retries();
                if !policy.backoff.is_zero() {
                    tokio::time::sleep(policy.backoff).await;
                }
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> StoreError {
        StoreError::Conflict {
            kind: "Secret",
            name: "ns/puller-config".into(),
        }
    }

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_conflicts_within_budget() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_on_conflict(fast(5), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(conflict())
            } else {
                Ok("written")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "written");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_exhausted_budget_returns_last_conflict() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry_on_conflict(fast(5), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;
        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry_on_conflict(fast(5), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Transport("connection reset".into()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let _ = retry_on_conflict(fast(0), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, StoreError>(())
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
