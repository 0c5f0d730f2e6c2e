//! Maps `PipelineError` to HTTP status codes and JSON error bodies, the way
//! `sem_os_server::error` maps `SemOsError`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ei_core::PipelineError;
use serde_json::json;

pub struct AppError(PipelineError);

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": self.0.to_string(),
            "code": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}
