use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use swatchr_core::{AuditFilter, AuditPage, AuditRecord};

use super::error::ApiError;
use crate::state::AppState;

/// Query parameters for audit endpoint
#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    /// Filter by entity key
    pub key: Option<String>,
    /// Filter by event type
    pub event_type: Option<String>,
    /// Filter events after this timestamp (ISO 8601)
    pub from: Option<DateTime<Utc>>,
    /// Filter events before this timestamp (ISO 8601)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of events to return (default 100, max 1000)
    pub limit: Option<i64>,
    /// Pagination offset (default 0)
    pub offset: Option<i64>,
}

/// Response for audit query endpoint
#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    /// List of audit events, newest first
    pub events: Vec<AuditRecord>,
    /// Total number of matching events
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// GET /api/v1/audit
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditQueryResponse>, ApiError> {
    let page = AuditPage::new(params.limit, params.offset);

    let mut filter = AuditFilter::default().between(params.from, params.to);
    if let Some(key) = params.key {
        filter = filter.entity(key);
    }
    if let Some(event_type) = params.event_type {
        filter = filter.kind(event_type);
    }

    let events = state
        .audit_store()
        .query(&filter, page)
        .map_err(|e| ApiError::internal(format!("Failed to query audit events: {}", e)))?;

    let total = state
        .audit_store()
        .count(&filter)
        .map_err(|e| ApiError::internal(format!("Failed to count audit events: {}", e)))?;

    Ok(Json(AuditQueryResponse {
        events,
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}
