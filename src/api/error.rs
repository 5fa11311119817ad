use crate::services::error::PipelineError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Message callers see for any upstream failure. Details stay in the logs.
pub const PROCESSING_FAILED: &str = "processing failed";

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Pipeline(PipelineError::ClientInput { message, missing }) => {
                tracing::warn!("Rejected request: {}", message);
                let body = if missing.is_empty() {
                    json!({ "error": message })
                } else {
                    json!({ "error": message, "missing": missing })
                };
                (StatusCode::BAD_REQUEST, body)
            }
            AppError::Pipeline(e) => {
                let stage = e.stage();
                tracing::error!("Pipeline error at {} stage: {}", stage, e);
                let status = match e {
                    PipelineError::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (
                    status,
                    json!({ "error": PROCESSING_FAILED, "stage": stage.as_str() }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
