/// Send-email hook endpoint
///
/// Always answers 200 with `{}` once the signature (if any) checks out, so the
/// provider never retries a hook because of our own delivery problems.
/// Invalid payloads are logged and dropped.
use crate::error::HookError;
use crate::metrics;
use crate::models::RawAuthEvent;
use crate::services::{EventNormalizer, TemplateDispatcher};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::HttpServerState;

/// What happened to one hook invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Dispatched { attempted: usize, delivered: usize },
    Dropped { reason: &'static str },
}

impl HookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            HookOutcome::Dispatched {
                attempted,
                delivered,
            } if attempted == delivered => "dispatched",
            HookOutcome::Dispatched { .. } => "send_failed",
            HookOutcome::Dropped { reason } => *reason,
        }
    }
}

/// Validate, normalize and dispatch one hook body.
pub async fn handle_payload(
    normalizer: &EventNormalizer,
    dispatcher: &TemplateDispatcher,
    body: &[u8],
) -> HookOutcome {
    let raw = match RawAuthEvent::from_slice(body) {
        Ok(raw) => raw,
        Err(e) => return dropped(&e),
    };

    let event = match normalizer.normalize(&raw) {
        Ok(event) => event,
        Err(e) => return dropped(&e),
    };

    let report = dispatcher.dispatch(&event).await;
    HookOutcome::Dispatched {
        attempted: report.attempted(),
        delivered: report.delivered(),
    }
}

fn dropped(err: &HookError) -> HookOutcome {
    warn!(kind = err.kind(), error = %err, "Dropping auth hook payload");
    HookOutcome::Dropped { reason: err.kind() }
}

pub(super) async fn send_email_hook(
    State(state): State<Arc<HttpServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let hook_id = headers
        .get("webhook-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let span = info_span!("send_email_hook", hook_id = %hook_id);

    async move {
        if let Some(secret) = &state.hook_secret {
            let now = state.normalizer.clock().now().timestamp();
            if let Err(e) = secret.verify(&headers, &body, now) {
                error!(error = %e, "Rejecting auth hook with invalid signature");
                metrics::record_hook_event(e.kind());
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "invalid_signature" })),
                )
                    .into_response();
            }
        }

        let outcome = handle_payload(&state.normalizer, &state.dispatcher, &body).await;
        metrics::record_hook_event(outcome.label());
        info!(outcome = outcome.label(), "Auth hook handled");

        (StatusCode::OK, Json(json!({}))).into_response()
    }
    .instrument(span)
    .await
}
