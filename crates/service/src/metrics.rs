//! Prometheus metrics for the archiver services.
//!
//! Exposed at `/metrics` on the operator listener, which deployments keep
//! network-restricted to authorized scrapers.

use axum::extract::MatchedPath;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};
use std::time::Instant;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static HTTP_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("fca_http_requests_total", "HTTP requests by route and status"),
        &["route", "method", "status"],
    )
    .expect("metric creation failed")
});

pub static HTTP_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "fca_http_request_duration_seconds",
            "HTTP request latency by route",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["route"],
    )
    .expect("metric creation failed")
});

pub static LOCKS_GRANTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("fca_locks_granted_total", "Lease acquisitions and renewals granted")
        .expect("metric creation failed")
});

pub static LOCKS_REJECTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "fca_locks_rejected_total",
        "Lease requests rejected because another worker holds the peer",
    )
    .expect("metric creation failed")
});

pub static RESOLVER_CACHE_HITS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("fca_resolver_cache_hits_total", "Resolver cache hits")
        .expect("metric creation failed")
});

pub static RESOLVER_CACHE_MISSES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("fca_resolver_cache_misses_total", "Resolver cache misses")
        .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register all metrics with the registry. Idempotent.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(HTTP_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(HTTP_REQUEST_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LOCKS_GRANTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LOCKS_REJECTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RESOLVER_CACHE_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RESOLVER_CACHE_MISSES.clone()))
            .expect("metric registration failed");
    });
}

/// Serve the registry in the Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response();
    }

    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "metrics were not valid UTF-8");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response()
        }
    }
}

/// Axum middleware recording request counts and latency per matched route.
pub async fn track_requests(request: Request<axum::body::Body>, next: Next) -> axum::response::Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let started = Instant::now();
    let response = next.run(request).await;

    HTTP_REQUESTS
        .with_label_values(&[&route, &method, response.status().as_str()])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[&route])
        .observe(started.elapsed().as_secs_f64());

    response
}
