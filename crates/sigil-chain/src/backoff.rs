//! Bounded retry with exponential backoff and full jitter.
//!
//! Only retryable failures ([`ChainError::is_retryable`]) are attempted
//! again: transport errors and rate limits. Authentication failures and
//! broadcasts surface immediately.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

use sigil_core::constants::{RETRY_ATTEMPTS, RETRY_BASE_MS, RETRY_CAP_MS};

use crate::error::ChainError;

/// Backoff schedule: attempts, base delay, cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: RETRY_ATTEMPTS,
            base: Duration::from_millis(RETRY_BASE_MS),
            cap: Duration::from_millis(RETRY_CAP_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (0-based): full jitter, a uniform draw
    /// from `[0, min(base·2^attempt, cap)]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.cap);
        let jitter = rand::thread_rng().gen_range(0.0..=1.0);
        exp.mul_f64(jitter)
    }
}

/// Run an idempotent operation under a retry policy.
pub async fn retry<T, F, Fut>(
    policy: RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let mut last_err = ChainError::Network(format!("{op_name}: no attempts made"));
    for attempt in 0..policy.attempts.max(1) {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.attempts => {
                let delay = policy.delay(attempt);
                debug!(op = op_name, attempt, ?delay, %err, "retrying");
                tokio::time::sleep(delay).await;
                last_err = err;
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result = retry(fast_policy(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ChainError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_network_errors() {
        let calls = AtomicU32::new(0);
        let result = retry(fast_policy(), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ChainError::Network("flaky".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_rate_limits() {
        let calls = AtomicU32::new(0);
        let result = retry(fast_policy(), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ChainError::RateLimited)
                } else {
                    Ok("ok")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn auth_errors_are_fatal() {
        let calls = AtomicU32::new(0);
        let err = retry(fast_policy(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ChainError::AuthFailed("bad key".into())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ChainError::AuthFailed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let err = retry(fast_policy(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ChainError::Network("down".into())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ChainError::Network(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            attempts: 10,
            base: Duration::from_millis(500),
            cap: Duration::from_millis(8_000),
        };
        for attempt in 0..10 {
            assert!(policy.delay(attempt) <= Duration::from_millis(8_000));
        }
    }

    #[test]
    fn delay_stays_within_nominal_window() {
        let policy = RetryPolicy {
            attempts: 4,
            base: Duration::from_millis(500),
            cap: Duration::from_millis(8_000),
        };
        // Full jitter: every draw lands in [0, min(base·2^attempt, cap)].
        for attempt in 0..4u32 {
            let nominal = policy
                .base
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(policy.cap);
            for _ in 0..16 {
                assert!(policy.delay(attempt) <= nominal);
            }
        }
    }
}
