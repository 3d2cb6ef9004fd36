//! Maps [`SentinelError`] onto an HTTP status and JSON body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sentinel_engine::SentinelError;
use serde_json::json;

pub struct ApiError(pub SentinelError);

impl From<SentinelError> for ApiError {
    fn from(error: SentinelError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SentinelError::Blocked(_) => StatusCode::FORBIDDEN,
            SentinelError::PlannerRefused(_) => StatusCode::OK,
            SentinelError::InvalidPlan(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SentinelError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            SentinelError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SentinelError::Auth(_) => StatusCode::UNAUTHORIZED,
            SentinelError::Fatal(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = json!({
            "error": self.0.to_string(),
            "block_kind": self.0.block_kind(),
        });
        (status, Json(body)).into_response()
    }
}
