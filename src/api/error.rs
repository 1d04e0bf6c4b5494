use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use crate::error::ArboreaError;

/// Wrapper that maps domain errors onto HTTP responses. Validation and
/// transition failures are the caller's fault; storage failures are ours.
pub struct ApiError(ArboreaError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<ArboreaError> for ApiError {
    fn from(err: ArboreaError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ArboreaError::Validation { .. } | ArboreaError::IllegalTransition { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ArboreaError::PermitNotFound(_) | ArboreaError::SpeciesNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
