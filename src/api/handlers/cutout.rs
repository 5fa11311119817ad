use super::credentials_from;
use crate::AppState;
use crate::api::error::AppError;
use crate::services::jobs::CutoutOptions;
use crate::services::orchestrator::{FinalResult, SubmissionInput};
use crate::services::uploader::UploadRequest;
use axum::{Json, extract::State, http::HeaderMap};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

/// Body of `POST /cutout`. Send `upload` to stage the image in S3 first,
/// or `imageUrl` to hand the source straight to the job service.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CutoutRequest {
    pub image_url: Option<String>,
    pub upload: Option<UploadRequest>,
    #[serde(default)]
    pub options: CutoutOptions,
    pub api_key: Option<String>,
}

#[utoipa::path(
    post,
    path = "/cutout",
    request_body = CutoutRequest,
    params(
        ("x-api-key" = Option<String>, Header, description = "Job service API key"),
        ("Authorization" = Option<String>, Header, description = "Bearer token for the job service")
    ),
    responses(
        (status = 200, description = "Background removed", body = FinalResult),
        (status = 400, description = "Missing required parameters"),
        (status = 502, description = "Upstream stage failed"),
        (status = 504, description = "Job did not finish within the poll budget")
    ),
    tag = "jobs"
)]
pub async fn cutout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CutoutRequest>,
) -> Result<Json<FinalResult>, AppError> {
    let input = SubmissionInput {
        resource_location: req.image_url,
        options: req.options,
        credentials: credentials_from(
            &headers,
            req.api_key.as_deref(),
            state.config.service_api_key.as_deref(),
        ),
    };

    info!(
        "✂️  Cutout requested (staged: {})",
        req.upload.is_some()
    );
    let result = state.orchestrator.run(req.upload.as_ref(), &input).await?;
    Ok(Json(result))
}
