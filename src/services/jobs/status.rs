use super::{JobCredentials, JobHandle, JobState, JobStatus};
use crate::services::error::PipelineError;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use tracing::debug;

/// Asks the processing service where a job stands. One request per call.
#[derive(Clone)]
pub struct StatusQuery {
    http: reqwest::Client,
    status_base_url: String,
}

impl StatusQuery {
    pub fn new(http: reqwest::Client, status_base_url: impl Into<String>) -> Self {
        Self {
            http,
            status_base_url: status_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, handle: &JobHandle) -> String {
        match &handle.status_url {
            Some(url) => url.clone(),
            None => format!(
                "{}/{}",
                self.status_base_url,
                urlencode_segment(&handle.id)
            ),
        }
    }

    pub async fn query(
        &self,
        handle: &JobHandle,
        credentials: &JobCredentials,
    ) -> Result<JobStatus, PipelineError> {
        let url = self.url_for(handle);
        let mut request = self.http.get(&url).header("x-api-key", &credentials.api_key);
        if let Some(token) = &credentials.bearer_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::poll_query(&handle.id, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PipelineError::poll_query(&handle.id, e))?;

        if !status.is_success() {
            return Err(PipelineError::poll_query(
                &handle.id,
                format!("status endpoint returned {}: {}", status, text),
            ));
        }

        let body: Value = serde_json::from_str(&text).map_err(|e| {
            PipelineError::poll_query(&handle.id, format!("invalid status body: {}", e))
        })?;
        let parsed = parse_status(&handle.id, body)?;
        debug!("Job {} is {}", handle.id, parsed.label());
        Ok(parsed)
    }
}

/// Map a status body onto the three known states.
///
/// Anything outside the known vocabulary is an error, never "still running".
pub fn parse_status(job_id: &str, body: Value) -> Result<JobStatus, PipelineError> {
    let raw = body
        .get("status")
        .or_else(|| body.pointer("/outputs/0/status"))
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::poll_query(job_id, "status body has no status field"))?
        .to_ascii_lowercase();

    let state = match raw.as_str() {
        "pending" | "starting" | "running" => JobState::Running,
        "succeeded" | "completed" | "done" => {
            let output_url = result_location(&body).ok_or_else(|| {
                PipelineError::poll_query(job_id, "completed status without a result location")
            })?;
            JobState::Completed { output_url }
        }
        "failed" | "error" => JobState::Failed {
            detail: failure_detail(&body),
        },
        other => {
            return Err(PipelineError::poll_query(
                job_id,
                format!("unrecognized job status '{}'", other),
            ));
        }
    };

    Ok(JobStatus {
        state,
        details: body,
    })
}

fn result_location(body: &Value) -> Option<String> {
    [
        "/output/href",
        "/href",
        "/result/outputs/0/destination/url",
        "/outputs/0/_links/renditions/0/href",
    ]
    .iter()
    .find_map(|pointer| body.pointer(pointer).and_then(Value::as_str))
    .filter(|url| !url.is_empty())
    .map(str::to_string)
}

fn failure_detail(body: &Value) -> String {
    for field in ["error", "errors", "message"] {
        match body.get(field) {
            Some(Value::String(s)) if !s.is_empty() => return s.clone(),
            Some(Value::String(_)) | Some(Value::Null) | None => {}
            Some(other) => return other.to_string(),
        }
    }
    body.to_string()
}

fn urlencode_segment(segment: &str) -> String {
    percent_encoding::utf8_percent_encode(segment, percent_encoding::NON_ALPHANUMERIC).to_string()
}
