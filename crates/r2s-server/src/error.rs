//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use r2s_core::export::ExportError;
use r2s_core::PipelineError;
use r2s_store::StoreError;

/// Every way a request can fail, mapped onto a status and a JSON body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    /// The validator's reply, returned to the caller unchanged.
    #[error("validation rejected")]
    ValidationRejected(Value),
    #[error("{0}")]
    Upstream(String),
    #[error("Database not configured. Set a database path to enable snapshots.")]
    StoreUnavailable,
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::ValidationRejected(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) | Self::StoreUnavailable | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::ValidationRejected(detail) => {
                info!("edit rejected by validator");
                (status, Json(detail)).into_response()
            }
            Self::Upstream(msg) => {
                warn!(error = %msg, "upstream failure");
                (status, Json(json!({ "error": msg }))).into_response()
            }
            Self::Internal(msg) => {
                error!(error = %msg, "internal error");
                (status, Json(json!({ "error": msg }))).into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::BadRequest(msg) => Self::BadRequest(msg),
            PipelineError::ValidationRejected(detail) => Self::ValidationRejected(detail),
            PipelineError::Upstream(msg) => Self::Upstream(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Self::NotFound(e.to_string()),
            StoreError::InvalidInput(msg) => Self::BadRequest(msg),
            StoreError::Unavailable => Self::StoreUnavailable,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(e: ExportError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn bad_request_has_error_body() {
        let (status, body) = body_of(ApiError::bad_request("missing resident_mcr")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "missing resident_mcr"}));
    }

    #[tokio::test]
    async fn validation_rejection_is_verbatim() {
        let detail = json!({"success": false, "errors": ["ED blocks exceeded"]});
        let (status, body) = body_of(ApiError::ValidationRejected(detail.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, detail);
    }

    #[tokio::test]
    async fn upstream_is_500() {
        let err: ApiError = PipelineError::Upstream("Postprocess failed".into()).into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Postprocess failed");
    }

    #[test]
    fn store_errors_map_to_statuses() {
        assert_eq!(ApiError::from(StoreError::NotFound("Snapshot 3".into())).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(StoreError::InvalidInput("Snapshot name is required".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert!(matches!(ApiError::from(StoreError::Unavailable), ApiError::StoreUnavailable));
        assert_eq!(
            ApiError::from(StoreError::Database("disk I/O error".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn export_error_is_bad_request() {
        let err = ApiError::from(ExportError::InvalidShape);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid API response shape");
    }
}
