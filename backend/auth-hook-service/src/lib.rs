/// Auth Hook Service Library
///
/// Receives send-email hooks from the identity provider, turns them into
/// localized transactional emails, and completes OAuth authorization-code
/// callbacks with bounded retries.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `error`: Error types
/// - `http`: axum router (hook, callback, health, metrics)
/// - `metrics`: Prometheus counters
/// - `models`: Hook payload shapes and locales
/// - `services`: Business logic (normalization, templates, dispatch, email, oauth)
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use error::{ExchangeFailure, HookError, Result};
pub use http::{build_router, HttpServerState};
