//! Single-retry policy for outbound calls.

use std::future::Future;
use std::time::Duration;

use crate::error::AppResult;

/// Run `op`, and if it fails run it exactly once more after `backoff`.
///
/// The second error is returned as-is.
pub async fn with_single_retry<T, F, Fut>(label: &str, backoff: Duration, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(
                "{} failed: {}. Retrying once in {}ms",
                label,
                e,
                backoff.as_millis()
            );
            tokio::time::sleep(backoff).await;
            op().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_once_then_succeeds() {
        let calls = AtomicUsize::new(0);
        let result = with_single_retry("flaky", Duration::from_millis(1), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::Upstream("first".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_second_failure() {
        let calls = AtomicUsize::new(0);
        let result: AppResult<()> = with_single_retry("down", Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Upstream("still down".into()))
        })
        .await;

        assert!(matches!(result, Err(AppError::Upstream(msg)) if msg == "still down"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn success_does_not_retry() {
        let calls = AtomicUsize::new(0);
        with_single_retry("ok", Duration::from_secs(60), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
