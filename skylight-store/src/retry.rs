//! Bounded retry and timeout policy for gateway calls.
//!
//! Retries happen at the gateway boundary only: transient transport errors
//! and timeouts get a fixed number of attempts with fixed backoff, logical
//! outcomes (missing objects, decode failures, auth rejections) surface
//! immediately. Callers above the gateways never retry.

use skylight_core::GatewayError;
use std::future::Future;
use std::time::Duration;

/// Wrap a gateway future with a deadline.
///
/// On timeout the operation fails with a retryable [`GatewayError::Timeout`]
/// and no partial state is committed (the underlying future is dropped).
pub async fn bounded<T, Fut>(
    operation: &str,
    limit: Duration,
    fut: Fut,
) -> Result<T, GatewayError>
where
    Fut: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout {
            operation: operation.to_string(),
            elapsed_ms: limit.as_millis() as u64,
        }),
    }
}

/// Run a gateway call with bounded attempts and fixed backoff.
///
/// `attempts` counts the first try; `attempts = 3` means at most two retries.
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    attempts: u32,
    backoff: Duration,
    mut call: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                tracing::warn!(
                    operation,
                    attempt,
                    error = %err,
                    "Retrying transient gateway error"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_with_retry_succeeds_after_transient_errors() {
        let calls = AtomicU32::new(0);

        let result = with_retry("test op", 3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GatewayError::Transport {
                        reason: "flaky".to_string(),
                    })
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_after_bounded_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry("test op", 3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(GatewayError::Transport {
                    reason: "down".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_logical_errors() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry("test op", 3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(GatewayError::Decode {
                    reason: "bad json".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), _> = bounded("slow op", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(GatewayError::Timeout { operation, .. }) => {
                assert_eq!(operation, "slow op");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bounded_passes_through_fast_results() {
        let result = bounded("fast op", Duration::from_secs(1), async { Ok(41) }).await;
        assert_eq!(result.unwrap(), 41);
    }
}
