use super::{CutoutOptions, JobCredentials, JobHandle};
use crate::services::error::PipelineError;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Value, json};
use tracing::{debug, error, info};

/// Sends one cutout job to the processing service. No retries.
#[derive(Clone)]
pub struct JobSubmitter {
    http: reqwest::Client,
    submit_url: String,
}

impl JobSubmitter {
    pub fn new(http: reqwest::Client, submit_url: impl Into<String>) -> Self {
        Self {
            http,
            submit_url: submit_url.into(),
        }
    }

    pub async fn submit(
        &self,
        resource_location: &str,
        options: &CutoutOptions,
        credentials: &JobCredentials,
    ) -> Result<JobHandle, PipelineError> {
        let body = request_body(resource_location, options);
        info!("📤 Submitting {} job for {}", options.mode, resource_location);
        debug!("Request body: {}", body);

        let mut request = self
            .http
            .post(&self.submit_url)
            .header("x-api-key", &credentials.api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(&body);
        if let Some(token) = &credentials.bearer_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| PipelineError::Submission {
            status: None,
            body: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| PipelineError::Submission {
            status: Some(status.as_u16()),
            body: format!("failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            error!("Job service error: {} - {}", status, text);
            return Err(PipelineError::Submission {
                status: Some(status.as_u16()),
                body: text,
            });
        }

        let handle = parse_submission(&text).ok_or_else(|| PipelineError::Submission {
            status: Some(status.as_u16()),
            body: format!("response carried no job id: {}", text),
        })?;
        info!("🆔 Job {} accepted", handle.id);
        Ok(handle)
    }
}

pub(crate) fn request_body(resource_location: &str, options: &CutoutOptions) -> Value {
    json!({
        "image": {
            "source": {
                "url": resource_location
            }
        },
        "mode": options.mode,
        "output": {
            "mediaType": options.media_type
        },
        "trim": options.trim,
        "colorDecontamination": options.color_decontamination
    })
}

/// Pull the job id (and status link, when offered) out of a 2xx body.
pub(crate) fn parse_submission(text: &str) -> Option<JobHandle> {
    let content: Value = serde_json::from_str(text).ok()?;
    let id = content
        .get("jobId")
        .or_else(|| content.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())?;

    let mut handle = JobHandle::new(id);
    handle.status_url = content
        .get("statusUrl")
        .or_else(|| content.pointer("/_links/self/href"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(handle)
}
