use crate::services::error::PipelineError;
use crate::services::jobs::{
    CutoutOptions, JobApi, JobCredentials, JobHandle, JobPoller, JobState, JobStatus,
};
use crate::services::uploader::{StreamingUploader, UploadRequest, UploadResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

/// What to send to the job service when nothing is staged first.
#[derive(Debug, Clone, Default)]
pub struct SubmissionInput {
    pub resource_location: Option<String>,
    pub options: CutoutOptions,
    pub credentials: JobCredentials,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinalResult {
    pub success: bool,
    pub original_image: String,
    pub processed_image: String,
    pub job_id: String,
    pub attempts: u32,
    pub staged: Option<UploadResult>,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
}

/// Runs stage → submit → poll for one request. Stages run strictly in
/// order and the first error ends the run.
pub struct Orchestrator {
    uploader: StreamingUploader,
    jobs: Arc<dyn JobApi>,
    poller: JobPoller,
}

impl Orchestrator {
    pub fn new(uploader: StreamingUploader, jobs: Arc<dyn JobApi>, poller: JobPoller) -> Self {
        Self {
            uploader,
            jobs,
            poller,
        }
    }

    pub async fn run(
        &self,
        upload: Option<&UploadRequest>,
        input: &SubmissionInput,
    ) -> Result<FinalResult, PipelineError> {
        let original = validate(upload, input)?;

        let staged = match upload {
            Some(request) => Some(self.uploader.upload(request).await?),
            None => None,
        };
        let location = match &staged {
            Some(result) => result.location().to_string(),
            None => original.clone(),
        };

        let handle = self
            .jobs
            .submit(&location, &input.options, &input.credentials)
            .await?;
        let outcome = self
            .poller
            .poll(self.jobs.as_ref(), &handle, &input.credentials)
            .await?;

        match outcome.status.state {
            JobState::Completed { output_url } => {
                info!("✅ Job {} produced {}", handle.id, output_url);
                Ok(FinalResult {
                    success: true,
                    original_image: original,
                    processed_image: output_url,
                    job_id: handle.id,
                    attempts: outcome.attempts,
                    staged,
                    details: outcome.status.details,
                })
            }
            JobState::Failed { detail } => {
                error!("❌ Job {} failed: {}", handle.id, detail);
                Err(PipelineError::JobFailed {
                    job_id: handle.id,
                    detail,
                })
            }
            // The poller only hands back terminal states.
            JobState::Running => Err(PipelineError::poll_query(
                &handle.id,
                "poller returned a non-terminal status",
            )),
        }
    }

    /// Staging on its own.
    pub async fn stage(&self, request: &UploadRequest) -> Result<UploadResult, PipelineError> {
        self.uploader.upload(request).await
    }

    /// Submission on its own; the caller polls later.
    pub async fn submit(&self, input: &SubmissionInput) -> Result<JobHandle, PipelineError> {
        let location = validate(None, input)?;
        self.jobs
            .submit(&location, &input.options, &input.credentials)
            .await
    }

    /// One status query, no waiting.
    pub async fn query(
        &self,
        handle: &JobHandle,
        credentials: &JobCredentials,
    ) -> Result<JobStatus, PipelineError> {
        if credentials.api_key.trim().is_empty() {
            return Err(PipelineError::missing(["x-api-key"]));
        }
        self.jobs.status(handle, credentials).await
    }
}

/// Check every required input before any I/O. Returns the original source
/// reference.
fn validate(upload: Option<&UploadRequest>, input: &SubmissionInput) -> Result<String, PipelineError> {
    let mut missing: Vec<String> = Vec::new();
    let mut original = None;

    match upload {
        Some(request) => match request.required() {
            Ok((url, _)) => original = Some(url.to_string()),
            Err(PipelineError::ClientInput { missing: fields, .. }) => missing.extend(fields),
            Err(other) => return Err(other),
        },
        None => {
            original = input
                .resource_location
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            if original.is_none() {
                missing.push("imageUrl".to_string());
            }
        }
    }

    if input.credentials.api_key.trim().is_empty() {
        missing.push("x-api-key".to_string());
    }

    match original {
        Some(original) if missing.is_empty() => Ok(original),
        _ => Err(PipelineError::missing(missing)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(location: Option<&str>, api_key: &str) -> SubmissionInput {
        SubmissionInput {
            resource_location: location.map(str::to_string),
            credentials: JobCredentials {
                api_key: api_key.to_string(),
                bearer_token: None,
            },
            ..SubmissionInput::default()
        }
    }

    fn missing_of(err: PipelineError) -> Vec<String> {
        match err {
            PipelineError::ClientInput { missing, .. } => missing,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_direct_submission() {
        assert_eq!(
            validate(None, &input(Some("https://img/cat.png"), "key")).unwrap(),
            "https://img/cat.png"
        );
        assert_eq!(
            missing_of(validate(None, &input(None, "")).unwrap_err()),
            vec!["imageUrl", "x-api-key"]
        );
    }

    #[test]
    fn test_validate_staged_submission() {
        let request = UploadRequest::new("https://img/cat.png", "uploads");
        assert_eq!(
            validate(Some(&request), &input(None, "key")).unwrap(),
            "https://img/cat.png"
        );

        let empty = UploadRequest::default();
        assert_eq!(
            missing_of(validate(Some(&empty), &input(None, "key")).unwrap_err()),
            vec!["url", "bucket"]
        );
    }
}
