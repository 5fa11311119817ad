use super::status::StatusQuery;
use super::{CutoutOptions, JobApi, JobCredentials, JobHandle, JobStatus, JobSubmitter};
use crate::services::error::PipelineError;
use async_trait::async_trait;

/// HTTP client for a background-removal service with a submit endpoint and
/// a per-job status endpoint.
#[derive(Clone)]
pub struct CutoutJobClient {
    submitter: JobSubmitter,
    status: StatusQuery,
}

impl CutoutJobClient {
    pub fn new(http: reqwest::Client, submit_url: &str, status_base_url: &str) -> Self {
        Self {
            submitter: JobSubmitter::new(http.clone(), submit_url),
            status: StatusQuery::new(http, status_base_url),
        }
    }
}

#[async_trait]
impl JobApi for CutoutJobClient {
    async fn submit(
        &self,
        resource_location: &str,
        options: &CutoutOptions,
        credentials: &JobCredentials,
    ) -> Result<JobHandle, PipelineError> {
        self.submitter
            .submit(resource_location, options, credentials)
            .await
    }

    async fn status(
        &self,
        handle: &JobHandle,
        credentials: &JobCredentials,
    ) -> Result<JobStatus, PipelineError> {
        self.status.query(handle, credentials).await
    }
}
