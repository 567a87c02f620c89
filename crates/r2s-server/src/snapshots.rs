//! Snapshot endpoints. Every call checks the store is configured first and
//! runs the blocking SQLite work off the async runtime.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use tracing::{info, instrument};

use r2s_store::{NewSnapshot, Snapshot, SnapshotPatch, SnapshotRepo, StoreError};

use crate::error::ApiError;
use crate::handlers::parse_json;
use crate::server::AppState;

async fn with_store<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&SnapshotRepo) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let repo = state.snapshots.clone().ok_or(ApiError::StoreUnavailable)?;
    tokio::task::spawn_blocking(move || f(&repo))
        .await
        .map_err(|e| ApiError::internal(format!("store task failed: {e}")))?
        .map_err(ApiError::from)
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid snapshot id: {raw}")))
}

/// GET /api/db-status
pub async fn db_status(State(state): State<AppState>) -> Json<Value> {
    let available = match state.snapshots.clone() {
        Some(repo) => tokio::task::spawn_blocking(move || repo.database().ping())
            .await
            .unwrap_or(false),
        None => false,
    };
    Json(json!({ "available": available }))
}

/// GET /api/snapshots
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let snapshots = with_store(&state, |repo| repo.list()).await?;
    Ok(Json(json!({ "snapshots": snapshots })))
}

/// POST /api/snapshots
#[instrument(skip_all)]
pub async fn create(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let new = NewSnapshot::from_value(&parse_json(&body)?)?;
    let summary = with_store(&state, move |repo| repo.create(&new)).await?;
    info!(snapshot_id = summary.id, "snapshot created");
    Ok(Json(json!({ "success": true, "snapshot": summary })))
}

/// GET /api/snapshots/latest
pub async fn latest(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let snapshot = with_store(&state, |repo| repo.latest()).await?;
    Ok(Json(json!({ "snapshot": snapshot })))
}

/// GET /api/snapshots/{id}
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Snapshot>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(with_store(&state, move |repo| repo.get(id)).await?))
}

/// PUT /api/snapshots/{id}
#[instrument(skip_all)]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let patch = SnapshotPatch::from_value(&parse_json(&body)?)?;
    let summary = with_store(&state, move |repo| repo.update(id, &patch)).await?;
    Ok(Json(json!({ "success": true, "snapshot": summary })))
}

/// DELETE /api/snapshots/{id}
#[instrument(skip_all)]
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    with_store(&state, move |repo| repo.delete(id)).await?;
    Ok(Json(json!({ "success": true, "message": "Snapshot deleted" })))
}
