// src/retry.rs

use crate::error::{Result, TutorError};
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub call_timeout: Duration,
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn once(call_timeout: Duration) -> Self {
        RetryPolicy {
            call_timeout,
            max_retries: 0,
            backoff_base: Duration::ZERO,
        }
    }
}

/// Runs `op` under the policy's timeout, retrying transient failures with
/// linear backoff. Non-retryable errors are returned on first sight.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        let result = match tokio::time::timeout(policy.call_timeout, op()).await {
            Ok(r) => r,
            Err(_) => Err(TutorError::TransientIo(format!(
                "{} timed out after {:?}",
                label, policy.call_timeout
            ))),
        };

        match result {
            Ok(v) => {
                if attempt > 0 {
                    debug!("[Retry] {} succeeded on attempt {}", label, attempt + 1);
                }
                return Ok(v);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff_base * attempt;
                warn!(
                    "[Retry] {} failed ({}), retry {}/{} in {:?}",
                    label, e, attempt, policy.max_retries, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            call_timeout: Duration::from_millis(50),
            max_retries,
            backoff_base: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let out = with_retry(&policy(3), "flaky", || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TutorError::TransientIo("blip".into()))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = with_retry(&policy(2), "down", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TutorError::TransientIo("down".into()))
        })
        .await
        .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn not_found_is_never_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = with_retry(&policy(5), "missing", || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TutorError::NotFound("users/u1".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, TutorError::NotFound(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_becomes_transient() {
        let err = with_retry(&policy(0), "slow", || async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, TutorError::TransientIo(_)));
    }
}
