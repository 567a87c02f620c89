//! Pipeline endpoints.

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::Uri;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;
use tracing::{debug, instrument};

use r2s_core::export::{ExportError, TimetableGrid, CSV_FILENAME};
use r2s_core::model::SolverInput;
use r2s_core::reconcile::SaveRequest;
use r2s_core::TimetableResult;

use crate::error::ApiError;
use crate::form;
use crate::health::{health_check, HealthResponse};
use crate::server::AppState;

async fn read_body(request: Request, state: &AppState) -> Result<Bytes, ApiError> {
    Bytes::from_request(request, state)
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

pub(crate) fn parse_json(body: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
}

/// POST /api/solve
///
/// A multipart form goes through input preparation first; any other body is
/// read as an already-prepared solver input.
#[instrument(skip_all)]
pub async fn solve(State(state): State<AppState>, request: Request) -> Result<Json<TimetableResult>, ApiError> {
    let result = if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        let form = form::collect(multipart).await?;
        if form.is_empty() {
            return Err(ApiError::bad_request("No form data provided"));
        }
        debug!(fields = form.fields.len(), files = form.files.len(), "solve form received");
        state.pipeline.solve_form(form).await?
    } else {
        let body = read_body(request, &state).await?;
        let input: SolverInput = serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid solver input: {e}")))?;
        state.pipeline.solve(input).await?
    };
    Ok(Json(result))
}

/// POST /api/save
#[instrument(skip_all)]
pub async fn save(State(state): State<AppState>, body: Bytes) -> Result<Json<TimetableResult>, ApiError> {
    let body = parse_json(&body)?;
    let request = SaveRequest::from_value(&body)?;
    Ok(Json(state.pipeline.save(request).await?))
}

/// POST /api/download-csv
#[instrument(skip_all)]
pub async fn download_csv(body: Bytes) -> Result<impl IntoResponse, ApiError> {
    let doc: Value = serde_json::from_slice(&body).map_err(|_| ExportError::InvalidShape)?;
    let grid = TimetableGrid::from_document(&doc)?;
    debug!(rows = grid.len(), "timetable exported");
    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{CSV_FILENAME}\"")),
        ],
        grid.to_csv(),
    ))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_check(state.start_time))
}

/// Fallback for unmatched routes.
pub async fn not_found(uri: Uri) -> ApiError {
    if uri.path().starts_with("/api") {
        ApiError::not_found("API endpoint not found")
    } else {
        ApiError::not_found("Not found")
    }
}
