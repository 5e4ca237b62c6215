//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Catalog (space usage, entities per state, quota rejections)
//! - Event bus (published changes, dropped subscribers)
//! - Lifecycle (estimator ticks, metadata timeouts, completions)

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts};

// =============================================================================
// Catalog Metrics
// =============================================================================

/// Bytes committed across all entities.
pub static CATALOG_USED_BYTES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("swatchr_catalog_used_bytes", "Bytes committed in the catalog").unwrap()
});

/// Configured storage quota.
pub static CATALOG_QUOTA_BYTES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("swatchr_catalog_quota_bytes", "Configured storage quota").unwrap()
});

/// Entities per lifecycle state.
pub static ENTITIES_BY_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("swatchr_entities", "Catalog entities by state"),
        &["state"], // "indexing", "active", "paused", "done", "failed"
    )
    .unwrap()
});

/// Metadata commits rejected for lack of space.
pub static QUOTA_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "swatchr_quota_rejections_total",
        "Total acquisitions rejected by the storage quota",
    )
    .unwrap()
});

// =============================================================================
// Event Bus Metrics
// =============================================================================

/// Changes published by kind.
pub static EVENTS_PUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("swatchr_events_published_total", "Total changes published"),
        &["kind"],
    )
    .unwrap()
});

/// Subscribers disconnected because their queue overflowed.
pub static SUBSCRIBER_DISCONNECTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "swatchr_subscriber_disconnects_total",
        "Total subscribers dropped for falling behind",
    )
    .unwrap()
});

// =============================================================================
// Lifecycle Metrics
// =============================================================================

/// Estimator sampling ticks by outcome.
pub static ESTIMATOR_TICKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("swatchr_estimator_ticks_total", "Total progress sampling ticks"),
        &["outcome"], // "progress", "stalled", "paused", "error", "completed"
    )
    .unwrap()
});

/// Metadata resolutions that timed out.
pub static METADATA_TIMEOUTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "swatchr_metadata_timeouts_total",
        "Total metadata resolutions that timed out",
    )
    .unwrap()
});

/// Acquisitions that reached a terminal state, by state.
pub static ACQUISITIONS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "swatchr_acquisitions_finished_total",
            "Total acquisitions that reached a terminal state",
        ),
        &["state"], // "done", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Catalog
        Box::new(CATALOG_USED_BYTES.clone()),
        Box::new(CATALOG_QUOTA_BYTES.clone()),
        Box::new(ENTITIES_BY_STATE.clone()),
        Box::new(QUOTA_REJECTIONS.clone()),
        // Event bus
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(SUBSCRIBER_DISCONNECTS.clone()),
        // Lifecycle
        Box::new(ESTIMATOR_TICKS.clone()),
        Box::new(METADATA_TIMEOUTS.clone()),
        Box::new(ACQUISITIONS_FINISHED.clone()),
    ]
}
