use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The pipeline stage an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Input,
    Fetch,
    Storage,
    Submission,
    Poll,
    Job,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Fetch => "fetch",
            Stage::Storage => "storage",
            Stage::Submission => "submission",
            Stage::Poll => "poll",
            Stage::Job => "job",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{message}")]
    ClientInput {
        message: String,
        missing: Vec<String>,
    },

    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Storage {operation} failed: {detail}")]
    Storage {
        operation: &'static str,
        detail: String,
    },

    #[error("Job submission failed with status {}: {body}", display_status(.status))]
    Submission { status: Option<u16>, body: String },

    #[error("Status query for job {job_id} failed: {detail}")]
    PollQuery { job_id: String, detail: String },

    #[error("Job {job_id} still running after {attempts} status queries ({elapsed:?})")]
    PollTimeout {
        job_id: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("Job {job_id} failed: {detail}")]
    JobFailed { job_id: String, detail: String },
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

impl PipelineError {
    /// Client error naming every missing required field.
    pub fn missing<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let missing: Vec<String> = fields.into_iter().map(Into::into).collect();
        Self::ClientInput {
            message: format!("missing parameter(s) '{}'", missing.join(", ")),
            missing,
        }
    }

    pub fn storage(operation: &'static str, err: impl fmt::Display) -> Self {
        Self::Storage {
            operation,
            detail: err.to_string(),
        }
    }

    pub fn fetch(url: &str, reason: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn poll_query(job_id: &str, detail: impl fmt::Display) -> Self {
        Self::PollQuery {
            job_id: job_id.to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::ClientInput { .. } => Stage::Input,
            PipelineError::Fetch { .. } => Stage::Fetch,
            PipelineError::Storage { .. } => Stage::Storage,
            PipelineError::Submission { .. } => Stage::Submission,
            PipelineError::PollQuery { .. } | PipelineError::PollTimeout { .. } => Stage::Poll,
            PipelineError::JobFailed { .. } => Stage::Job,
        }
    }
}
