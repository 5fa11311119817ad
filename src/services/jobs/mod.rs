use crate::services::error::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod cutout;
pub mod poller;
pub mod status;
pub mod submitter;

pub use cutout::CutoutJobClient;
pub use poller::{JobPoller, PollOutcome, PollPolicy};
pub use submitter::JobSubmitter;

/// Credentials for the job service, passed into every call.
#[derive(Clone, Default)]
pub struct JobCredentials {
    pub api_key: String,
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for JobCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCredentials")
            .field("api_key", &"<redacted>")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Knobs sent along with a cutout submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CutoutOptions {
    pub mode: String,
    pub media_type: String,
    pub trim: bool,
    pub color_decontamination: u8,
}

impl Default for CutoutOptions {
    fn default() -> Self {
        Self {
            mode: "cutout".to_string(),
            media_type: "image/png".to_string(),
            trim: true,
            color_decontamination: 1,
        }
    }
}

/// A submitted job. Lives for one request only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    #[serde(rename = "jobId")]
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status_url: Option<String>,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            status_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Running,
    Completed { output_url: String },
    Failed { detail: String },
}

/// One observation of a job, with the raw upstream body kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    pub details: serde_json::Value,
}

impl JobStatus {
    pub fn running() -> Self {
        Self {
            state: JobState::Running,
            details: serde_json::Value::Null,
        }
    }

    pub fn completed(output_url: impl Into<String>) -> Self {
        Self {
            state: JobState::Completed {
                output_url: output_url.into(),
            },
            details: serde_json::Value::Null,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            state: JobState::Failed {
                detail: detail.into(),
            },
            details: serde_json::Value::Null,
        }
    }

    pub fn label(&self) -> &'static str {
        match self.state {
            JobState::Running => "running",
            JobState::Completed { .. } => "completed",
            JobState::Failed { .. } => "failed",
        }
    }

    /// Completed and Failed are absorbing.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.state, JobState::Running)
    }
}

/// A remote service that accepts a job and reports on it later.
///
/// `submit` makes exactly one request and fails with
/// [`PipelineError::Submission`]. `status` makes exactly one request and
/// fails with [`PipelineError::PollQuery`], including when the service
/// answers with a status it does not recognise.
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn submit(
        &self,
        resource_location: &str,
        options: &CutoutOptions,
        credentials: &JobCredentials,
    ) -> Result<JobHandle, PipelineError>;

    async fn status(
        &self,
        handle: &JobHandle,
        credentials: &JobCredentials,
    ) -> Result<JobStatus, PipelineError>;
}
