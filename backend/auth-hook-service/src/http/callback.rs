/// OAuth callback endpoint
///
/// Completes the authorization-code flow and redirects the browser. Failures
/// land on `/auth/error` with a reason the frontend can show: `link_expired`
/// for rejected codes, `network` when transient errors outlasted the retries.
use crate::error::{ExchangeFailure, HookError};
use crate::services::normalizer::normalize_site_url;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::Redirect,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::HttpServerState;

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub next: Option<String>,
}

/// Redirect reason for a failed callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackReason {
    MissingCode,
    LinkExpired,
    Network,
}

impl CallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackReason::MissingCode => "missing_code",
            CallbackReason::LinkExpired => "link_expired",
            CallbackReason::Network => "network",
        }
    }
}

impl From<&ExchangeFailure> for CallbackReason {
    fn from(failure: &ExchangeFailure) -> Self {
        match failure {
            ExchangeFailure::Retryable { .. } => CallbackReason::Network,
            ExchangeFailure::Terminal { .. } => CallbackReason::LinkExpired,
        }
    }
}

/// Keep only same-origin relative paths; anything else becomes `/`.
pub fn sanitize_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/",
    }
}

/// Origin the browser used to reach us, falling back to `default_site_url`.
pub fn request_origin(headers: &HeaderMap, default_site_url: &str) -> String {
    let host = first_header(headers, "x-forwarded-host")
        .or_else(|| first_header(headers, header::HOST.as_str()));
    match host {
        Some(host) => {
            let scheme = first_header(headers, "x-forwarded-proto").unwrap_or("http");
            normalize_site_url(&format!("{}://{}", scheme, host))
        }
        None => normalize_site_url(default_site_url),
    }
}

fn first_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn error_redirect(origin: &str, reason: CallbackReason) -> Redirect {
    Redirect::to(&format!("{}/auth/error?reason={}", origin, reason.as_str()))
}

pub(super) async fn oauth_callback(
    State(state): State<Arc<HttpServerState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let origin = request_origin(&headers, &state.default_site_url);

    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        warn!("OAuth callback without authorization code");
        return error_redirect(&origin, CallbackReason::MissingCode);
    };

    match state.oauth.complete(code).await {
        Ok(summary) => {
            let next = sanitize_next(params.next.as_deref());
            info!(attempts = summary.attempts.len(), next, "OAuth callback completed");
            Redirect::to(&format!("{}{}", origin, next))
        }
        Err(failure) => {
            let reason = CallbackReason::from(&failure);
            let err = HookError::from(failure);
            warn!(
                reason = reason.as_str(),
                kind = err.kind(),
                error = %err,
                "OAuth callback failed"
            );
            error_redirect(&origin, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_sanitize_next() {
        assert_eq!(sanitize_next(None), "/");
        assert_eq!(sanitize_next(Some("/dashboard?tab=1")), "/dashboard?tab=1");
        assert_eq!(sanitize_next(Some("//evil.example.com")), "/");
        assert_eq!(sanitize_next(Some("https://evil.example.com")), "/");
        assert_eq!(sanitize_next(Some("")), "/");
    }

    #[test]
    fn test_exchange_failures_map_to_distinct_reasons() {
        use crate::services::ExchangeError;

        let terminal = ExchangeFailure::Terminal {
            source: ExchangeError::new("AuthApiError", "invalid_grant"),
        };
        let retryable = ExchangeFailure::Retryable {
            attempts: 3,
            source: ExchangeError::new("TypeError", "fetch failed"),
        };

        assert_eq!(CallbackReason::from(&terminal), CallbackReason::LinkExpired);
        assert_eq!(CallbackReason::from(&retryable), CallbackReason::Network);
        assert_eq!(HookError::from(terminal).kind(), "code_exchange_terminal");
        assert_eq!(HookError::from(retryable).kind(), "code_exchange_retryable");
    }

    #[test]
    fn test_origin_prefers_forwarded_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("internal:8080"));
        headers.insert("x-forwarded-host", HeaderValue::from_static("app.example.com"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));

        assert_eq!(
            request_origin(&headers, "http://localhost:3000"),
            "https://app.example.com"
        );
    }

    #[test]
    fn test_origin_falls_back_to_site_url() {
        assert_eq!(
            request_origin(&HeaderMap::new(), "https://app.example.com/path"),
            "https://app.example.com"
        );
    }
}
