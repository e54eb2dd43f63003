//! Bounded retry for adapter writes
//!
//! Adapter writes are retried a fixed number of times with a fixed delay
//! between attempts. A failure marked permanent (quota, bad request,
//! corruption) is returned at once.

use crate::model::SyncResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How often and how patiently to retry
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay policy
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Retry an adapter write whose failure is reported as a failed [`SyncResult`]
///
/// Returns the first successful result or the last failed one, along with
/// the number of attempts made.
pub async fn retry_write<F, Fut>(policy: &RetryPolicy, mut write: F) -> (SyncResult, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = write().await;
        if result.success {
            if attempt > 1 {
                debug!(session_id = %result.session_id, attempt = attempt, "Write succeeded after retry");
            }
            return (result, attempt);
        }
        if result.permanent {
            debug!(
                session_id = %result.session_id,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Write failed permanently, not retrying"
            );
            return (result, attempt);
        }
        if attempt >= max_attempts {
            return (result, attempt);
        }

        warn!(
            session_id = %result.session_id,
            attempt = attempt,
            max_attempts = max_attempts,
            delay_ms = policy.delay.as_millis() as u64,
            error = result.error.as_deref().unwrap_or("unknown"),
            "Write failed, retrying"
        );
        sleep(policy.delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_retry_write_exhausts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let (result, attempts) = retry_write(&quick(3), || {
            let c = counter.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                SyncResult::failed("s1", "remote down")
            }
        })
        .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("remote down"));
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_write_returns_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let (result, attempts) = retry_write(&quick(4), || {
            let c = counter.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    SyncResult::failed("s1", "blip")
                } else {
                    SyncResult::ok("s1")
                }
            }
        })
        .await;

        assert!(result.success);
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_retry_write_stops_on_permanent_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let (result, attempts) = retry_write(&quick(5), || {
            let c = counter.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                SyncResult::from_error(
                    "s1",
                    &Error::QuotaExceeded {
                        needed: 10,
                        available: 2,
                    },
                )
            }
        })
        .await;

        assert!(!result.success);
        assert!(result.permanent);
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_write_retries_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let (result, attempts) = retry_write(&quick(3), || {
            let c = counter.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                SyncResult::from_error(
                    "s1",
                    &Error::Http {
                        status: 503,
                        message: "unavailable".to_string(),
                    },
                )
            }
        })
        .await;

        assert!(!result.permanent);
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
