/// Timeout wrapper for a single outbound attempt
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("Operation timed out after {0:?}")]
    Elapsed(Duration),
}

/// Execute a future with timeout
///
/// A zero duration disables the limit and awaits the future as-is.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    if duration.is_zero() {
        return Ok(future.await);
    }

    timeout(duration, future)
        .await
        .map_err(|_| TimeoutError::Elapsed(duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_elapsed() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert_eq!(result, Err(TimeoutError::Elapsed(Duration::from_millis(10))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_disables_limit() {
        let result = with_timeout(Duration::ZERO, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            "done"
        })
        .await;

        assert_eq!(result, Ok("done"));
    }
}
