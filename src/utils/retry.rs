use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Error, Result};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

const ATTEMPTS: u32 = 2;

/// Runs a transient I/O operation with a timeout, retrying it once.
///
/// Callers decide what a final failure means (a lookup becomes "not found", a
/// log write becomes best effort); this helper only bounds the wait.
pub async fn retry_once<T, F, Fut>(label: &str, timeout: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err: Option<Error> = None;

    for attempt in 1..=ATTEMPTS {
        match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                log_warn!("{label} failed (attempt {attempt}/{ATTEMPTS}): {err:#}");
                last_err = Some(err);
            }
            Err(_) => {
                log_warn!("{label} timed out after {timeout:?} (attempt {attempt}/{ATTEMPTS})");
                last_err = Some(anyhow!("{label} timed out after {timeout:?}"));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{label} failed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn second_attempt_can_succeed() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_once("flaky", Duration::from_secs(1), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(anyhow!("busy"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_two_timeouts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = retry_once("slow", Duration::from_millis(50), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
