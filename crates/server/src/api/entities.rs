//! Entity API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use swatchr_core::{CatalogSnapshot, CatalogStats, EntityRecord};

use super::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateEntityRequest {
    pub title: String,
    pub descriptor: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/entities
///
/// The whole catalog, records in insertion order.
pub async fn list_entities(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CatalogSnapshot>, ApiError> {
    Ok(Json(state.service().list()?))
}

/// POST /api/v1/entities
///
/// Register an acquisition. Returns as soon as the entity is recorded;
/// metadata and progress arrive on the change feed.
pub async fn create_entity(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateEntityRequest>,
) -> Result<(StatusCode, Json<EntityRecord>), ApiError> {
    let record = state
        .service()
        .request_add(&request.title, &request.descriptor)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/v1/entities/{key}
pub async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<EntityRecord>, ApiError> {
    state
        .service()
        .get(&key)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Entity not found: {}", key)))
}

/// DELETE /api/v1/entities/{key}
///
/// Stops the transfer and deletes the payload from disk.
pub async fn remove_entity(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<EntityRecord>, ApiError> {
    Ok(Json(state.service().request_remove(&key).await?))
}

/// POST /api/v1/entities/{key}/pause
pub async fn pause_entity(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<EntityRecord>, ApiError> {
    Ok(Json(state.service().pause(&key).await?))
}

/// POST /api/v1/entities/{key}/resume
pub async fn resume_entity(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<EntityRecord>, ApiError> {
    Ok(Json(state.service().resume(&key).await?))
}

/// GET /api/v1/catalog/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CatalogStats>, ApiError> {
    Ok(Json(state.service().stats()?))
}
