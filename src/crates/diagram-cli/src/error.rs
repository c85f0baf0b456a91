//! Error type for the CLI/server crate, plus the axum `IntoResponse`
//! mapping from a [`pipeline::PipelineError`] onto an HTTP status code.
//!
//! Grounded on `orchestrator::api::error::ApiError` (a flat error enum with
//! a JSON body: `{error, message, code}`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("startup failed: {0}")]
    Startup(String),

    #[error("configuration error: {0}")]
    Config(#[from] tooling::ToolingError),

    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

/// Wraps a [`pipeline::PipelineError`] so it can be returned directly from
/// an axum handler.
pub struct ApiError(pub pipeline::PipelineError);

impl From<pipeline::PipelineError> for ApiError {
    fn from(e: pipeline::PipelineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            pipeline::PipelineError::InputInvalid(_) => (StatusCode::BAD_REQUEST, "input_invalid"),
            pipeline::PipelineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            pipeline::PipelineError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            pipeline::PipelineError::BackendUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable"),
            pipeline::PipelineError::Io(_) | pipeline::PipelineError::Serialization(_) | pipeline::PipelineError::Other(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };

        let body = ErrorBody { error: kind.to_string(), message: self.0.to_string() };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_invalid_maps_to_bad_request() {
        let response = ApiError(pipeline::PipelineError::InputInvalid("bad name".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = ApiError(pipeline::PipelineError::NotFound("task".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let response = ApiError(pipeline::PipelineError::Conflict("exists".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
