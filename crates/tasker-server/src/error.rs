use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use tasker_auth::AuthError;
use tasker_core::ServiceError;

/// Error returned by every handler. Rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self(e.into())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self(ServiceError::internal(format!("blocking task failed: {e}")))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match &self.0 {
            ServiceError::Internal(detail) => {
                tracing::error!(kind = self.0.error_kind(), error = %detail, "request failed");
            }
            other => {
                tracing::debug!(kind = other.error_kind(), error = %other, "request rejected");
            }
        }
        (status, Json(json!({ "error": self.0.public_message() }))).into_response()
    }
}
