use crate::config::PipelineConfig;
use crate::services::jobs::{CutoutJobClient, JobApi, JobPoller, PollPolicy};
use crate::services::orchestrator::Orchestrator;
use crate::services::storage::ObjectStore;
use crate::services::uploader::StreamingUploader;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub fn build_poll_policy(config: &PipelineConfig) -> Result<PollPolicy> {
    let mut policy = PollPolicy::new(config.poll_delay())?.with_max_attempts(config.poll_max_attempts);
    if let Some(secs) = config.poll_max_duration_secs {
        policy = policy.with_max_duration(Duration::from_secs(secs));
    }
    Ok(policy)
}

/// Wire the uploader, job client and poller around a store and job service.
pub fn build_orchestrator(
    config: &PipelineConfig,
    store: Arc<dyn ObjectStore>,
    jobs: Arc<dyn JobApi>,
) -> Result<Orchestrator> {
    // No client-wide timeout: fetches carry their own and part uploads go
    // through the S3 client.
    let fetch_client = reqwest::Client::builder()
        .user_agent(concat!("cutout-pipeline/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")?;

    let uploader = StreamingUploader::new(
        fetch_client,
        store,
        config.part_size,
        config.queue_size,
        config.fetch_timeout(),
        config.region.clone(),
    );
    let policy = build_poll_policy(config)?;

    info!(
        "⚙️  Pipeline: part={}MB, queue={}, poll every {:?} (max attempts {:?}, max duration {:?})",
        config.part_size / 1024 / 1024,
        config.queue_size,
        policy.delay(),
        policy.max_attempts(),
        policy.max_duration()
    );

    Ok(Orchestrator::new(uploader, jobs, JobPoller::new(policy)))
}

pub fn setup_job_client(config: &PipelineConfig) -> Result<Arc<CutoutJobClient>> {
    let http = reqwest::Client::builder()
        .timeout(config.job_request_timeout())
        .user_agent(concat!("cutout-pipeline/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create job service client")?;

    info!("🛰️  Job service: {} (status: {})", config.job_submit_url, config.job_status_url);
    Ok(Arc::new(CutoutJobClient::new(
        http,
        &config.job_submit_url,
        &config.job_status_url,
    )))
}
