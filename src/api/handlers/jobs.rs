use super::credentials_from;
use crate::AppState;
use crate::api::error::AppError;
use crate::services::jobs::{CutoutOptions, JobHandle, JobState};
use crate::services::orchestrator::SubmissionInput;
use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    pub image_url: Option<String>,
    #[serde(default)]
    pub options: CutoutOptions,
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    pub output_url: Option<String>,
    pub error: Option<String>,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
}

#[utoipa::path(
    post,
    path = "/jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 200, description = "Job accepted", body = JobHandle),
        (status = 400, description = "Missing required parameters"),
        (status = 502, description = "Job service rejected the submission")
    ),
    tag = "jobs"
)]
pub async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitJobRequest>,
) -> Result<Json<JobHandle>, AppError> {
    let input = SubmissionInput {
        resource_location: req.image_url,
        options: req.options,
        credentials: credentials_from(
            &headers,
            req.api_key.as_deref(),
            state.config.service_api_key.as_deref(),
        ),
    };
    let handle = state.orchestrator.submit(&input).await?;
    Ok(Json(handle))
}

#[utoipa::path(
    get,
    path = "/jobs/{job_id}",
    params(
        ("job_id" = String, Path, description = "Job id returned on submission"),
        ("x-api-key" = Option<String>, Header, description = "Job service API key")
    ),
    responses(
        (status = 200, description = "Current job status", body = JobStatusResponse),
        (status = 502, description = "Status query failed")
    ),
    tag = "jobs"
)]
pub async fn get_job_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let credentials =
        credentials_from(&headers, None, state.config.service_api_key.as_deref());
    let handle = JobHandle::new(job_id);
    let status = state.orchestrator.query(&handle, &credentials).await?;

    let label = status.label().to_string();
    let (output_url, error) = match status.state {
        JobState::Running => (None, None),
        JobState::Completed { output_url } => (Some(output_url), None),
        JobState::Failed { detail } => (None, Some(detail)),
    };

    Ok(Json(JobStatusResponse {
        job_id: handle.id,
        status: label,
        output_url,
        error,
        details: status.details,
    }))
}
