use crate::AppState;
use crate::api::error::AppError;
use crate::services::uploader::{UploadRequest, UploadResult};
use axum::{Json, extract::State};

#[utoipa::path(
    post,
    path = "/upload-url-to-s3",
    request_body = UploadRequest,
    responses(
        (status = 200, description = "Source streamed into the bucket", body = UploadResult),
        (status = 400, description = "Missing url or bucket"),
        (status = 502, description = "Fetch or storage failed")
    ),
    tag = "storage"
)]
pub async fn upload_url_to_s3(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResult>, AppError> {
    let result = state.orchestrator.stage(&req).await?;
    Ok(Json(result))
}
