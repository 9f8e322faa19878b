/// OAuth authorization-code completion
///
/// Exchanges the `code` from the provider callback for a session. Transient
/// transport failures are retried with exponential backoff; anything else
/// (expired or already used codes, bad requests) fails on the first attempt.
///
/// ## Classification
///
/// Errors are first mapped to a [`TransportErrorKind`] from structured
/// information (reqwest error flags, attempt timeouts). Only when the
/// transport gives nothing structured do we fall back to matching the error
/// name and message against known transient signatures.
use crate::config::OAuthExchangeSettings;
use crate::error::ExchangeFailure;
use crate::metrics;
use async_trait::async_trait;
use resilience::{with_classified_retry, with_timeout, ErrorClass, RetryAttempt, RetryConfig};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Transport error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Network,
    Timeout,
    Fetch,
    Aborted,
    ConnectionRefused,
    DnsNotFound,
    Other,
}

/// Case-insensitive signatures of transient failures, checked in order
const RETRYABLE_SIGNATURES: &[(&str, TransportErrorKind)] = &[
    ("econnrefused", TransportErrorKind::ConnectionRefused),
    ("connection refused", TransportErrorKind::ConnectionRefused),
    ("enotfound", TransportErrorKind::DnsNotFound),
    ("etimedout", TransportErrorKind::Timeout),
    ("timed out", TransportErrorKind::Timeout),
    ("timeout", TransportErrorKind::Timeout),
    ("aborted", TransportErrorKind::Aborted),
    ("fetch", TransportErrorKind::Fetch),
    ("network", TransportErrorKind::Network),
];

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Fetch => "fetch",
            Self::Aborted => "aborted",
            Self::ConnectionRefused => "connection_refused",
            Self::DnsNotFound => "dns_not_found",
            Self::Other => "other",
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Other)
    }

    /// Fallback classification from an unstructured error
    pub fn from_signature(name: &str, message: &str) -> Self {
        let haystack = format!("{} {}", name, message).to_ascii_lowercase();
        RETRYABLE_SIGNATURES
            .iter()
            .find(|(needle, _)| haystack.contains(needle))
            .map(|(_, kind)| *kind)
            .unwrap_or(Self::Other)
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by one code-exchange attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct ExchangeError {
    pub name: String,
    pub message: String,
    /// Structured category, when the transport provides one
    pub kind: Option<TransportErrorKind>,
    pub status: Option<u16>,
}

impl ExchangeError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            kind: None,
            status: None,
        }
    }

    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            name: format!("TransportError({})", kind),
            message: message.into(),
            kind: Some(kind),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn category(&self) -> TransportErrorKind {
        self.kind
            .unwrap_or_else(|| TransportErrorKind::from_signature(&self.name, &self.message))
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        let kind = if err.is_timeout() {
            Some(TransportErrorKind::Timeout)
        } else if err.is_connect() {
            let detail = format!("{:?}", err).to_ascii_lowercase();
            if detail.contains("dns") || detail.contains("lookup") {
                Some(TransportErrorKind::DnsNotFound)
            } else {
                Some(TransportErrorKind::ConnectionRefused)
            }
        } else if err.is_request() || err.is_body() {
            Some(TransportErrorKind::Network)
        } else {
            None
        };

        let mut error = ExchangeError::new("reqwest::Error", message);
        error.kind = kind;
        if let Some(status) = err.status() {
            error.status = Some(status.as_u16());
        }
        error
    }
}

/// Session exchange capability of the identity provider
#[async_trait]
pub trait SessionExchanger: Send + Sync {
    async fn exchange_code_for_session(&self, code: &str) -> Result<(), ExchangeError>;
}

/// Error body of the provider token endpoint
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<String>,
    error_code: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
}

/// Exchanges codes against the provider's token endpoint
#[derive(Clone)]
pub struct HttpSessionExchanger {
    http: Client,
    token_url: String,
    api_key: Option<String>,
}

impl HttpSessionExchanger {
    pub fn new(provider_url: &str, api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            token_url: format!(
                "{}/auth/v1/token?grant_type=pkce",
                provider_url.trim_end_matches('/')
            ),
            api_key,
        }
    }
}

#[async_trait]
impl SessionExchanger for HttpSessionExchanger {
    async fn exchange_code_for_session(&self, code: &str) -> Result<(), ExchangeError> {
        let mut request = self.http.post(&self.token_url).json(&json!({ "auth_code": code }));
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!("Provider accepted authorization code");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let (name, message) = match serde_json::from_str::<ProviderErrorBody>(&body) {
            Ok(parsed) => (
                parsed
                    .error_code
                    .or(parsed.error)
                    .unwrap_or_else(|| "AuthApiError".to_string()),
                parsed
                    .error_description
                    .or(parsed.msg)
                    .unwrap_or_else(|| status.to_string()),
            ),
            Err(_) => ("AuthApiError".to_string(), status.to_string()),
        };

        Err(ExchangeError::new(name, message).with_status(status.as_u16()))
    }
}

/// Successful exchange with its attempt trace
#[derive(Debug, Clone)]
pub struct ExchangeSummary {
    pub attempts: Vec<RetryAttempt>,
}

/// Completes OAuth callbacks through the retry policy
#[derive(Clone)]
pub struct OAuthCallbackService {
    exchanger: Arc<dyn SessionExchanger>,
    retry: RetryConfig,
    attempt_timeout: Duration,
}

impl OAuthCallbackService {
    pub fn new(
        exchanger: Arc<dyn SessionExchanger>,
        retry: RetryConfig,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            exchanger,
            retry,
            attempt_timeout,
        }
    }

    pub fn from_settings(
        exchanger: Arc<dyn SessionExchanger>,
        settings: &OAuthExchangeSettings,
    ) -> Self {
        Self::new(
            exchanger,
            RetryConfig {
                max_retries: settings.max_retries,
                base_delay: Duration::from_millis(settings.base_delay_ms),
                ..Default::default()
            },
            Duration::from_millis(settings.attempt_timeout_ms),
        )
    }

    /// Exchange `code` for a session.
    ///
    /// Terminal errors return after one attempt; exhausted transient errors
    /// return the last error seen.
    pub async fn complete(&self, code: &str) -> Result<ExchangeSummary, ExchangeFailure> {
        let exchanger = &self.exchanger;
        let attempt_timeout = self.attempt_timeout;

        let report = with_classified_retry(
            &self.retry,
            |err: &ExchangeError| {
                if err.is_retryable() {
                    ErrorClass::Retryable
                } else {
                    ErrorClass::Terminal
                }
            },
            || async move {
                match with_timeout(attempt_timeout, exchanger.exchange_code_for_session(code)).await
                {
                    Ok(result) => result,
                    Err(elapsed) => Err(ExchangeError::transport(
                        TransportErrorKind::Timeout,
                        elapsed.to_string(),
                    )),
                }
            },
        )
        .await;

        for attempt in &report.attempts {
            metrics::record_code_exchange_attempt(attempt.outcome.as_str());
        }

        let attempts = report.attempts;
        match report.result {
            Ok(()) => {
                info!(attempts = attempts.len(), "OAuth code exchange succeeded");
                Ok(ExchangeSummary { attempts })
            }
            Err(err) => {
                let exhausted = err.is_exhausted();
                let source = err.into_inner();
                warn!(
                    attempts = attempts.len(),
                    category = %source.category(),
                    error = %source,
                    exhausted,
                    "OAuth code exchange failed"
                );
                if exhausted {
                    Err(ExchangeFailure::Retryable {
                        attempts: attempts.len() as u32,
                        source,
                    })
                } else {
                    Err(ExchangeFailure::Terminal { source })
                }
            }
        }
    }
}
