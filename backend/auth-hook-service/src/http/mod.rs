/// HTTP surface of the Auth Hook Service
///
/// - `POST /hooks/send-email`: send-email hook called by the identity provider
/// - `GET /auth/callback`: OAuth authorization-code completion
/// - `GET /health`, `GET /metrics`
///
/// Signature checks on the hook run only when a hook secret is configured.
mod callback;
mod signature;
mod webhook;

pub use callback::{request_origin, sanitize_next, CallbackParams, CallbackReason};
pub use signature::{WebhookSecret, TIMESTAMP_TOLERANCE_SECS};
pub use webhook::{handle_payload, HookOutcome};

use crate::metrics;
use crate::services::{EventNormalizer, OAuthCallbackService, TemplateDispatcher};
use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared HTTP server state
#[derive(Clone)]
pub struct HttpServerState {
    pub normalizer: EventNormalizer,
    pub dispatcher: TemplateDispatcher,
    pub oauth: OAuthCallbackService,
    pub hook_secret: Option<WebhookSecret>,
    /// Origin used for callback redirects when the request carries no host
    pub default_site_url: String,
}

/// Build the HTTP router with all endpoints
pub fn build_router(state: HttpServerState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::serve_metrics))
        .route("/hooks/send-email", post(webhook::send_email_hook))
        .route("/auth/callback", get(callback::oauth_callback))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Start the HTTP server and run until `shutdown` resolves
pub async fn start_http_server<F>(
    state: HttpServerState,
    host: &str,
    port: u16,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Starting HTTP server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}
