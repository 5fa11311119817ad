use std::env;
use std::time::Duration;

/// Smallest part size S3 accepts for every part but the last.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Runtime configuration for the staging and job pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Custom S3 endpoint (MinIO, R2, ...). `None` uses AWS.
    pub s3_endpoint: Option<String>,

    /// Default S3 region (default: "us-east-1")
    pub region: String,

    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,

    /// Use path-style bucket addressing (default: false)
    pub s3_force_path_style: bool,

    /// Multipart part size in bytes (default: 10 MB)
    pub part_size: usize,

    /// Parts in flight at once (default: 4)
    pub queue_size: usize,

    /// Source fetch timeout in milliseconds (default: 30000)
    pub fetch_timeout_ms: u64,

    /// Job submission endpoint
    pub job_submit_url: String,

    /// Job status base URL, the job id is appended as the last path segment
    pub job_status_url: String,

    /// API key used when the caller does not send one
    pub service_api_key: Option<String>,

    /// Timeout for a single submission or status request in seconds (default: 30)
    pub job_request_timeout_secs: u64,

    /// Delay between status queries in milliseconds (default: 5000)
    pub poll_delay_ms: u64,

    /// Status queries before giving up (default: 60, 0 = unbounded)
    pub poll_max_attempts: u32,

    /// Wall-clock poll budget in seconds (default: unset)
    pub poll_max_duration_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            s3_endpoint: None,
            region: "us-east-1".to_string(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            s3_force_path_style: false,
            part_size: 10 * 1024 * 1024, // 10 MB
            queue_size: 4,
            fetch_timeout_ms: 30_000,
            job_submit_url: "https://image.adobe.io/v2/remove-background".to_string(),
            job_status_url: "https://image.adobe.io/v2/status".to_string(),
            service_api_key: None,
            job_request_timeout_secs: 30,
            poll_delay_ms: 5_000,
            poll_max_attempts: 60,
            poll_max_duration_secs: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            s3_endpoint: env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),

            region: env::var("AWS_REGION")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(default.region),

            aws_access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
            aws_secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),

            s3_force_path_style: env::var("S3_FORCE_PATH_STYLE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.s3_force_path_style),

            part_size: env::var("UPLOAD_PART_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.part_size)
                .max(MIN_PART_SIZE),

            queue_size: env::var("UPLOAD_QUEUE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.queue_size)
                .max(1),

            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.fetch_timeout_ms),

            job_submit_url: env::var("JOB_SUBMIT_URL").unwrap_or(default.job_submit_url),

            job_status_url: env::var("JOB_STATUS_URL").unwrap_or(default.job_status_url),

            service_api_key: env::var("SERVICE_API_KEY").ok().filter(|v| !v.is_empty()),

            job_request_timeout_secs: env::var("JOB_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.job_request_timeout_secs),

            poll_delay_ms: env::var("POLL_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0)
                .unwrap_or(default.poll_delay_ms),

            poll_max_attempts: env::var("POLL_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.poll_max_attempts),

            poll_max_duration_secs: env::var("POLL_MAX_DURATION_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Local MinIO defaults with a short poll cadence
    pub fn development() -> Self {
        Self {
            s3_endpoint: Some("http://127.0.0.1:9000".to_string()),
            aws_access_key_id: Some("minioadmin".to_string()),
            aws_secret_access_key: Some("minioadmin".to_string()),
            s3_force_path_style: true,
            poll_delay_ms: 1_000,
            poll_max_attempts: 30,
            ..Self::default()
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    pub fn job_request_timeout(&self) -> Duration {
        Duration::from_secs(self.job_request_timeout_secs)
    }
}
