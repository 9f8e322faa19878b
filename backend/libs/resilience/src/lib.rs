/// Resilience patterns for outbound calls
///
/// This library provides the building blocks services use around calls to
/// external providers:
/// - **Retry**: bounded exponential backoff driven by an error classifier, so
///   only transient failures are retried and every attempt is recorded
/// - **Timeout**: enforces a time limit on a single attempt
///
/// # Example: Retry only transient failures
///
/// ```rust,no_run
/// use resilience::{with_classified_retry, ErrorClass, RetryConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let config = RetryConfig::default();
///
///     let report = with_classified_retry(
///         &config,
///         |err: &String| {
///             if err.contains("timeout") {
///                 ErrorClass::Retryable
///             } else {
///                 ErrorClass::Terminal
///             }
///         },
///         || async {
///             // Your provider call here
///             Ok::<_, String>(())
///         },
///     )
///     .await;
///
///     println!("finished after {} attempt(s)", report.attempts.len());
/// }
/// ```
///
/// # Example: Bound a single attempt
///
/// ```rust,no_run
/// use resilience::with_timeout;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let result = with_timeout(Duration::from_secs(10), async {
///         // Your provider call here
///         42
///     })
///     .await;
///     assert!(result.is_ok());
/// }
/// ```

pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use retry::{
    with_classified_retry, AttemptOutcome, ErrorClass, RetryAttempt, RetryConfig, RetryError,
    RetryReport,
};
pub use timeout::{with_timeout, TimeoutError};
