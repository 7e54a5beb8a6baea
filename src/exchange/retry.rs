// =============================================================================
// Exponential backoff for exchange REST calls
// =============================================================================
//
// Up to 3 retries, base 100 ms, doubling. Retries only on retryable errors:
// connection refused/reset, timeout, HTTP 429/5xx, or a body containing
// "rate limit"/"service unavailable". This policy is deliberately distinct
// from the control proxy's linear 3-try policy (§9): do not unify them.
// =============================================================================

use std::time::Duration;

use anyhow::Result;
use tracing::warn;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 100;

/// Returns `true` if `err`'s message suggests the call is worth retrying.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("connection refused")
        || msg.contains("connection reset")
        || msg.contains("timed out")
        || msg.contains("timeout")
        || msg.contains(" 429")
        || msg.contains("rate limit")
        || msg.contains("service unavailable")
        || is_5xx(&msg)
}

fn is_5xx(msg: &str) -> bool {
    for code in 500..=599 {
        if msg.contains(&format!(" {code}")) {
            return true;
        }
    }
    false
}

/// Run `op` with exponential backoff. `op` is called again only if its
/// error is classified retryable by [`is_retryable`] and attempts remain.
pub async fn with_backoff<F, Fut, T>(name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if attempt > MAX_RETRIES || !is_retryable(&e) {
                    return Err(e);
                }
                let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt - 1));
                warn!(op = name, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying after transient error");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn retryable_classifies_rate_limit_and_5xx() {
        assert!(is_retryable(&anyhow::anyhow!("HTTP 429 Too Many Requests")));
        assert!(is_retryable(&anyhow::anyhow!("returned 503: service unavailable")));
        assert!(is_retryable(&anyhow::anyhow!("connection refused")));
        assert!(!is_retryable(&anyhow::anyhow!("returned 400: bad request")));
    }

    #[tokio::test]
    async fn with_backoff_retries_up_to_max_then_fails() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow::anyhow!("HTTP 500 internal")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }

    #[tokio::test]
    async fn with_backoff_does_not_retry_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow::anyhow!("returned 400: bad request")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_backoff_succeeds_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(anyhow::anyhow!("connection reset"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }
}
