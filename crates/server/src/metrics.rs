//! Prometheus metrics for the HTTP surface.
//!
//! - HTTP request metrics (latency, counts, in flight)
//! - WebSocket change feed connections and messages
//! - Orchestrator status (collected dynamically)
//!
//! Core metrics (catalog, event bus, estimator) are registered here too.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use tracing::error;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "swatchr_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("swatchr_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "swatchr_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "swatchr_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "swatchr_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("swatchr_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// Feeds closed by the server because the client fell behind.
pub static WS_FEED_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "swatchr_ws_feed_dropped_total",
        "WebSocket feeds closed because the subscriber queue overflowed",
    )
    .unwrap()
});

// =============================================================================
// Orchestrator Metrics (collected dynamically)
// =============================================================================

/// Orchestrator running state (1 = running, 0 = stopped).
pub static ORCHESTRATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "swatchr_orchestrator_running",
        "Whether the orchestrator is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Lifecycle tasks still running.
pub static TRANSFERS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "swatchr_transfers_active",
        "Number of entities with a running lifecycle task",
    )
    .unwrap()
});

/// Change feed subscribers.
pub static FEED_SUBSCRIBERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "swatchr_feed_subscribers",
        "Number of registered change feed subscribers",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry.register(Box::new(WS_FEED_DROPPED.clone())).unwrap();

    // Orchestrator
    registry
        .register(Box::new(ORCHESTRATOR_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(TRANSFERS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(FEED_SUBSCRIBERS.clone()))
        .unwrap();

    // Core metrics (catalog, event bus, estimator)
    for metric in swatchr_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the orchestrator gauges reflect the moment of
/// the scrape.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.service().status().await;
    ORCHESTRATOR_RUNNING.set(if status.running { 1 } else { 0 });
    TRANSFERS_ACTIVE.set(status.active_transfers as i64);
    FEED_SUBSCRIBERS.set(status.subscribers as i64);
}

/// Normalize a path for metric labels (replace keys with placeholders).
pub fn normalize_path(path: &str) -> String {
    static HASH_RE: Lazy<Option<regex_lite::Regex>> =
        Lazy::new(|| regex_lite::Regex::new(r"[0-9a-fA-F]{40}").ok());
    static NUMERIC_RE: Lazy<Option<regex_lite::Regex>> =
        Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").ok());

    let mut result = path.to_string();
    if let Some(re) = HASH_RE.as_ref() {
        result = re.replace_all(&result, "{key}").into_owned();
    }
    if let Some(re) = NUMERIC_RE.as_ref() {
        result = re.replace_all(&result, "/{id}$1").into_owned();
    }
    result
}
