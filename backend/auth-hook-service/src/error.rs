use crate::services::oauth::ExchangeError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HookError>;

#[derive(Debug, Error)]
pub enum HookError {
    /// Payload matches neither known shape or carries an unknown action type
    #[error("Payload schema invalid: {0}")]
    SchemaInvalid(String),

    /// Shape is known but the event lacks data needed to build an email
    #[error("Action unmappable: {0}")]
    ActionUnmappable(String),

    #[error("Failed to send email to {recipient}: {reason}")]
    SendFailure { recipient: String, reason: String },

    #[error(transparent)]
    CodeExchange(#[from] ExchangeFailure),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HookError {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            HookError::SchemaInvalid(_) => "schema_invalid",
            HookError::ActionUnmappable(_) => "action_unmappable",
            HookError::SendFailure { .. } => "send_failure",
            HookError::CodeExchange(ExchangeFailure::Retryable { .. }) => {
                "code_exchange_retryable"
            }
            HookError::CodeExchange(ExchangeFailure::Terminal { .. }) => "code_exchange_terminal",
            HookError::InvalidSignature => "invalid_signature",
            HookError::Configuration(_) => "configuration",
            HookError::Internal(_) => "internal",
        }
    }
}

/// Failure of the OAuth authorization-code exchange after the retry policy ran.
///
/// The two variants are kept apart so the callback can tell the user
/// "network issue, try again" from "this link has expired".
#[derive(Debug, Error)]
pub enum ExchangeFailure {
    #[error("Code exchange failed after {attempts} attempts: {source}")]
    Retryable { attempts: u32, source: ExchangeError },

    #[error("Code exchange rejected: {source}")]
    Terminal { source: ExchangeError },
}

impl ExchangeFailure {
    pub fn source_error(&self) -> &ExchangeError {
        match self {
            ExchangeFailure::Retryable { source, .. } | ExchangeFailure::Terminal { source } => {
                source
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeFailure::Retryable { .. })
    }
}

impl From<serde_json::Error> for HookError {
    fn from(err: serde_json::Error) -> Self {
        HookError::SchemaInvalid(err.to_string())
    }
}
