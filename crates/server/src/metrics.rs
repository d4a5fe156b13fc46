//! Prometheus metrics for the Rubrica server.
//!
//! The `/metrics` endpoint is unauthenticated so Prometheus can scrape it.
//! Metrics carry no document or signer identifiers, only modality and
//! outcome labels. Restrict the endpoint to the scraper at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{self, Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Signing requests by modality step and outcome (`ok` or an error code).
pub static SIGNATURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "rubrica_signature_requests_total",
            "Signing requests by action and outcome",
        ),
        &["action", "outcome"],
    )
    .expect("metric creation failed")
});

pub static SIGNATURE_CONFLICTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "rubrica_signature_conflicts_total",
        "Signing requests rejected with a conflict",
    )
    .expect("metric creation failed")
});

/// Verification runs by result (`intact`, `mismatch`, `unreadable`).
pub static VERIFICATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "rubrica_verifications_total",
            "Integrity verifications by result",
        ),
        &["result"],
    )
    .expect("metric creation failed")
});

pub static DOCUMENTS_REGISTERED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "rubrica_documents_registered_total",
        "Documents registered",
    )
    .expect("metric creation failed")
});

pub static DOCUMENT_BYTES_REGISTERED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "rubrica_document_bytes_registered_total",
        "Bytes of registered documents",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(SIGNATURES_TOTAL.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SIGNATURE_CONFLICTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(VERIFICATIONS_TOTAL.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOCUMENTS_REGISTERED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOCUMENT_BYTES_REGISTERED.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Count one signing request.
pub fn record_signature(action: &str, outcome: &str) {
    SIGNATURES_TOTAL.with_label_values(&[action, outcome]).inc();
}

/// Count one verification run.
pub fn record_verification(result: &str) {
    VERIFICATIONS_TOTAL.with_label_values(&[result]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();
        register_metrics();
        record_signature("demo", "ok");
        record_verification("intact");

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&REGISTRY.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("rubrica_signature_requests_total"));
        assert!(text.contains("rubrica_verifications_total"));
    }
}
