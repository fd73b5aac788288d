//! Batch query handlers

use axum::{
    extract::{Path, State},
    Json,
};
use kopi_core::Organization;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::AppState;
use crate::api::error::ApiError;

/// GET /api/all-batches
///
/// An empty ledger answers `[]`.
pub async fn all_batches(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let payload = state
        .sessions
        .evaluate(Organization::Farmer.user_identity(), "GetAllBatches", &[])
        .await?;

    if payload.is_empty() {
        return Ok(Json(Value::Array(Vec::new())));
    }
    Ok(Json(serde_json::from_slice(&payload)?))
}

/// GET /api/batch/{id}
pub async fn batch_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .sessions
        .evaluate(Organization::Farmer.user_identity(), "ReadBatch", &[id.clone()])
        .await;

    let payload = match result {
        Ok(payload) => payload,
        Err(e) if e.is_not_found() => {
            debug!(batch_id = %id, "Batch not found");
            return Err(ApiError::NotFound("Batch Not Found".into()));
        }
        Err(e) => return Err(e.into()),
    };

    if payload.is_empty() {
        return Err(ApiError::NotFound("Not Found".into()));
    }
    Ok(Json(serde_json::from_slice(&payload)?))
}
