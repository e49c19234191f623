//! Single bounded retry for provider calls.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Fixed backoff before the one retry.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(1000);

/// Run `op`; on a transient error, wait `backoff` and run it once more.
///
/// Non-transient errors and the second failure propagate unchanged.
pub async fn retry_once<T, F, Fut>(label: &str, backoff: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) if e.is_transient() => {
            tracing::debug!(call = label, error = %e, "transient failure, retrying once");
            tokio::time::sleep(backoff).await;
            op().await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NeoLabsError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_transient_once() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32> = retry_once("test", Duration::ZERO, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(NeoLabsError::Network("reset".into()))
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
        let result: Result<u32> = retry_once("test", Duration::ZERO, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(NeoLabsError::Network("down".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_parse_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32> = retry_once("test", Duration::ZERO, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(NeoLabsError::parse("bad body"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
