/// Retry policy with classified errors and exponential backoff
///
/// Every failure is handed to a classifier. Terminal failures return at once;
/// retryable failures sleep `base_delay * 2^(n-1)` before retry `n` until
/// `max_retries` is spent, then the last error is returned. No jitter is
/// applied, so the schedule is exact and testable.
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Backoff before the first retry, doubled for each later retry
    pub base_delay: Duration,
    /// Upper bound for a single backoff
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Backoff slept before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Verdict of the classifier for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RetryableFailure,
    TerminalFailure,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RetryableFailure => "retryable_failure",
            Self::TerminalFailure => "terminal_failure",
        }
    }
}

/// One executed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based ordinal
    pub index: u32,
    /// Backoff slept before this attempt started
    pub backoff: Duration,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("Non-retryable failure: {0}")]
    Terminal(E),
}

impl<E> RetryError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Terminal(err) => err,
        }
    }
}

/// Final result together with the attempt trace.
#[derive(Debug)]
pub struct RetryReport<T, E> {
    pub result: Result<T, RetryError<E>>,
    pub attempts: Vec<RetryAttempt>,
}

impl<T, E> RetryReport<T, E> {
    /// Sum of all backoffs slept while producing this report.
    pub fn total_backoff(&self) -> Duration {
        self.attempts.iter().map(|attempt| attempt.backoff).sum()
    }
}

/// Execute an operation, retrying only failures the classifier marks retryable
pub async fn with_classified_retry<F, Fut, T, E, C>(
    config: &RetryConfig,
    classify: C,
    mut f: F,
) -> RetryReport<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> ErrorClass,
    E: std::fmt::Display,
{
    let mut attempts = Vec::new();
    let mut backoff = Duration::ZERO;
    let mut index = 1;

    loop {
        match f().await {
            Ok(value) => {
                attempts.push(RetryAttempt {
                    index,
                    backoff,
                    outcome: AttemptOutcome::Success,
                });
                debug!(attempt = index, "Operation succeeded");
                return RetryReport {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(err) => {
                if classify(&err) == ErrorClass::Terminal {
                    attempts.push(RetryAttempt {
                        index,
                        backoff,
                        outcome: AttemptOutcome::TerminalFailure,
                    });
                    warn!(attempt = index, error = %err, "Non-retryable failure");
                    return RetryReport {
                        result: Err(RetryError::Terminal(err)),
                        attempts,
                    };
                }

                attempts.push(RetryAttempt {
                    index,
                    backoff,
                    outcome: AttemptOutcome::RetryableFailure,
                });

                if index > config.max_retries {
                    warn!(
                        attempts = index,
                        error = %err,
                        "Max retries ({}) reached", config.max_retries
                    );
                    return RetryReport {
                        result: Err(RetryError::Exhausted {
                            attempts: index,
                            last: err,
                        }),
                        attempts,
                    };
                }

                backoff = config.backoff_for(index);
                warn!(
                    error = %err,
                    "Retry attempt {}/{}, waiting {:?}",
                    index, config.max_retries, backoff
                );
                tokio::time::sleep(backoff).await;
                index += 1;
            }
        }
    }
}
