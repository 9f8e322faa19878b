/// Auth Hook Service Main Entry Point
///
/// Starts the HTTP server with:
/// - Send-email hook (normalization + template dispatch over SMTP)
/// - OAuth callback completion against the identity provider
/// - Health and Prometheus endpoints
use anyhow::{Context, Result};
use auth_hook_service::{
    config::Settings,
    http::{start_http_server, HttpServerState, WebhookSecret},
    services::{
        EventNormalizer, HttpSessionExchanger, NormalizerConfig, OAuthCallbackService,
        SmtpMailSender, StaticCatalog, SystemClock, TemplateDispatcher, TemplateRenderer,
    },
};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "auth_hook_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Auth Hook Service");

    let settings = Settings::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    let hook_secret = settings
        .hook
        .secret
        .as_deref()
        .map(WebhookSecret::parse)
        .transpose()
        .context("Invalid AUTH_HOOK_SECRET")?;
    if hook_secret.is_none() {
        warn!("AUTH_HOOK_SECRET not set - send-email hook signatures will not be verified");
    }

    let normalizer = EventNormalizer::new(
        Arc::new(SystemClock),
        NormalizerConfig {
            magiclink_reuse_threshold: settings.hook.magiclink_reuse_threshold()?,
            default_locale: settings.hook.default_locale,
        },
    );

    let sender = SmtpMailSender::new(&settings.email).context("Failed to initialize email")?;
    info!(smtp_enabled = sender.is_enabled(), "Email sender initialized");

    let dispatcher = TemplateDispatcher::new(
        TemplateRenderer::new(
            Arc::new(StaticCatalog::builtin()),
            settings.hook.default_site_url.clone(),
        ),
        Arc::new(sender),
    );

    let exchanger = HttpSessionExchanger::new(
        &settings.oauth.provider_url,
        settings.oauth.anon_key.clone(),
    );
    let oauth = OAuthCallbackService::from_settings(Arc::new(exchanger), &settings.oauth);

    let state = HttpServerState {
        normalizer,
        dispatcher,
        oauth,
        hook_secret,
        default_site_url: settings.hook.default_site_url.clone(),
    };

    start_http_server(
        state,
        &settings.server.host,
        settings.server.port,
        shutdown_signal(),
    )
    .await?;

    info!("Auth hook service shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
