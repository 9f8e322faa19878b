use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, TextEncoder};

fn register_counter(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)
        .expect("failed to create auth hook counter");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register auth hook counter");
    counter
}

static HOOK_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter(
        "auth_hook_events_total",
        "Auth email hook invocations by outcome",
        &["outcome"],
    )
});

static EMAIL_SENDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter(
        "auth_hook_email_sends_total",
        "Auth emails handed to the transport",
        &["action", "result"],
    )
});

static CODE_EXCHANGE_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_counter(
        "auth_hook_code_exchange_attempts_total",
        "OAuth authorization-code exchange attempts by outcome",
        &["outcome"],
    )
});

pub fn record_hook_event(outcome: &str) {
    HOOK_EVENTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_email_send(action: &str, result: &str) {
    EMAIL_SENDS_TOTAL.with_label_values(&[action, result]).inc();
}

pub fn record_code_exchange_attempt(outcome: &str) {
    CODE_EXCHANGE_ATTEMPTS_TOTAL
        .with_label_values(&[outcome])
        .inc();
}

/// Prometheus text exposition of the default registry
pub async fn serve_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate_per_label() {
        let before = EMAIL_SENDS_TOTAL
            .with_label_values(&["signup", "sent"])
            .get();
        record_email_send("signup", "sent");
        record_email_send("signup", "sent");
        let after = EMAIL_SENDS_TOTAL
            .with_label_values(&["signup", "sent"])
            .get();
        assert!(after >= before + 2);
    }

    #[tokio::test]
    async fn test_serve_metrics_exposes_registered_counters() {
        record_hook_event("processed");
        let response = serve_metrics().await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("auth_hook_events_total"));
    }
}
