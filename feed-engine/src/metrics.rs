//! Prometheus metrics for the feed service.

use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder};

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "feed_engine_http_requests_total",
            "Total HTTP requests handled by feed-engine",
        ),
        &["method", "path", "status"],
    )
    .expect("failed to create feed_engine_http_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register feed_engine_http_requests_total");
    counter
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "feed_engine_http_request_duration_seconds",
            "HTTP request latency for feed-engine",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
        ]),
        &["method", "path", "status"],
    )
    .expect("failed to create feed_engine_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register feed_engine_http_request_duration_seconds");
    histogram
});

static FEED_PAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "feed_engine_pages_total",
            "Feed pages served, by surface and result",
        ),
        &["surface", "result"],
    )
    .expect("failed to create feed_engine_pages_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register feed_engine_pages_total");
    counter
});

static FEED_SHORTFALLS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "feed_engine_shortfalls_total",
            "Pages where the fresh tier ran short and a fallback tier was consulted",
        ),
        &["surface"],
    )
    .expect("failed to create feed_engine_shortfalls_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register feed_engine_shortfalls_total");
    counter
});

static FEED_TIER_ROWS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "feed_engine_tier_rows_total",
            "Rows served per retrieval tier, by surface",
        ),
        &["surface", "tier"],
    )
    .expect("failed to create feed_engine_tier_rows_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register feed_engine_tier_rows_total");
    counter
});

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status_label])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status_label])
        .observe(elapsed.as_secs_f64());
}

/// Record one served feed page.
pub fn observe_feed_page(
    surface: &str,
    degraded: bool,
    fresh_rows: u64,
    global_rows: u64,
    resurfaced_rows: u64,
) {
    let result = if degraded { "degraded" } else { "ok" };
    FEED_PAGES_TOTAL.with_label_values(&[surface, result]).inc();
    if global_rows > 0 || resurfaced_rows > 0 {
        FEED_SHORTFALLS_TOTAL.with_label_values(&[surface]).inc();
    }
    FEED_TIER_ROWS_TOTAL
        .with_label_values(&[surface, "fresh"])
        .inc_by(fresh_rows);
    FEED_TIER_ROWS_TOTAL
        .with_label_values(&[surface, "global"])
        .inc_by(global_rows);
    FEED_TIER_ROWS_TOTAL
        .with_label_values(&[surface, "resurfaced"])
        .inc_by(resurfaced_rows);
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
