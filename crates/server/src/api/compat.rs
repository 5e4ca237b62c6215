//! Routes used by the browser extension.
//!
//! The extension posts magnets found on tracker pages and expects bare status
//! codes back: 201 on add, 409 when the entity is already known.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use swatchr_core::derive_key;
use tracing::info;

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub title: String,
    pub magnet: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    /// Content key, or the magnet it was derived from.
    pub key: String,
}

/// GET /ping
pub async fn ping() -> StatusCode {
    StatusCode::OK
}

/// POST /add
pub async fn add(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddRequest>,
) -> Result<StatusCode, ApiError> {
    let record = state
        .service()
        .request_add(&request.title, &request.magnet)
        .await?;
    info!(key = %record.key, "Added from extension");
    Ok(StatusCode::CREATED)
}

/// POST /remove
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RemoveRequest>,
) -> Result<StatusCode, ApiError> {
    let key = derive_key(&request.key).unwrap_or(request.key);
    state.service().request_remove(&key).await?;
    Ok(StatusCode::OK)
}
