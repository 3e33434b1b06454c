//! Prometheus metrics
//!
//! Tracks:
//! - inbound requests by route and status class
//! - resolution cache hits/misses and resolution latency by format
//! - remote cleanup outcomes

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};

/// Requests by route and status class (2xx/4xx/5xx)
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "reelgrab_http_requests_total",
        "Total HTTP requests by route and status class",
        &["route", "status"]
    )
    .expect("metric can be registered")
});

/// Cache lookups by format and outcome (hit/miss)
pub static CACHE_LOOKUPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "reelgrab_cache_lookups_total",
        "Resolution cache lookups by format and outcome",
        &["format", "outcome"]
    )
    .expect("metric can be registered")
});

/// Failed resolutions by format and error category
pub static RESOLUTION_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "reelgrab_resolution_failures_total",
        "Failed resolutions by format and error category",
        &["format", "category"]
    )
    .expect("metric can be registered")
});

/// Time to resolve a cache miss, by format
pub static RESOLUTION_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "reelgrab_resolution_duration_seconds",
        "Time spent resolving a cache miss",
        &["format"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("metric can be registered")
});

/// Remote object deletions by outcome (deleted/failed)
pub static REMOTE_CLEANUPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "reelgrab_remote_cleanups_total",
        "Deferred object store deletions by outcome",
        &["outcome"]
    )
    .expect("metric can be registered")
});

pub fn record_request(route: &str, status: u16) {
    let class = match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    };
    HTTP_REQUESTS_TOTAL.with_label_values(&[route, class]).inc();
}

pub fn record_cache_lookup(format: &str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    CACHE_LOOKUPS_TOTAL.with_label_values(&[format, outcome]).inc();
}

pub fn record_resolution_failure(format: &str, category: &str) {
    RESOLUTION_FAILURES_TOTAL.with_label_values(&[format, category]).inc();
}

pub fn record_cleanup(deleted: bool) {
    let outcome = if deleted { "deleted" } else { "failed" };
    REMOTE_CLEANUPS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Renders the default registry in text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
