use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use birthmark_registry::RegistryError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Flat authentication failure. The response body never says why.
    #[error("submission failed validation")]
    ValidationFailed,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    /// Registry writes still failing after the retry budget.
    #[error("storage unavailable")]
    StorageUnavailable,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            // The body never says which check failed.
            PipelineError::ValidationFailed => (
                StatusCode::FORBIDDEN,
                json!({ "result": "FAIL" }),
            ),
            PipelineError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            PipelineError::Registry(e) => {
                let status = match &e {
                    RegistryError::NotFound => StatusCode::NOT_FOUND,
                    RegistryError::UnknownParent
                    | RegistryError::MonotonicityViolation { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    RegistryError::CycleDetected => {
                        tracing::error!("provenance cycle surfaced to API");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, json!({ "error": e.to_string() }))
            }
            PipelineError::StorageUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "storage unavailable" }),
            ),
        };
        (status, Json(body)).into_response()
    }
}
