#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use cutout_pipeline::config::PipelineConfig;
use cutout_pipeline::infrastructure::pipeline::build_orchestrator;
use cutout_pipeline::services::error::PipelineError;
use cutout_pipeline::services::jobs::{
    CutoutOptions, JobApi, JobCredentials, JobHandle, JobStatus,
};
use cutout_pipeline::services::storage::{ObjectLocation, ObjectSettings, ObjectStore};
use cutout_pipeline::{AppState, create_app};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// In-memory multipart store. Completed objects are kept by key.
#[derive(Default)]
pub struct MemoryStore {
    pub settings: Mutex<Option<ObjectSettings>>,
    pub parts: Mutex<Vec<(i32, Bytes)>>,
    pub objects: Mutex<Vec<(ObjectLocation, Vec<u8>)>>,
    pub aborted: Mutex<bool>,
    pub created: Mutex<u32>,
}

impl MemoryStore {
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .find(|(loc, _)| loc.key == key)
            .map(|(_, data)| data.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create_multipart_upload(
        &self,
        _location: &ObjectLocation,
        settings: &ObjectSettings,
    ) -> anyhow::Result<String> {
        *self.settings.lock().unwrap() = Some(settings.clone());
        *self.created.lock().unwrap() += 1;
        Ok("mem-upload".to_string())
    }

    async fn upload_part(
        &self,
        _location: &ObjectLocation,
        _upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> anyhow::Result<String> {
        self.parts.lock().unwrap().push((part_number, data));
        Ok(format!("etag-{}", part_number))
    }

    async fn complete_multipart_upload(
        &self,
        location: &ObjectLocation,
        _upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> anyhow::Result<()> {
        let mut stored = self.parts.lock().unwrap().clone();
        stored.sort_by_key(|(n, _)| *n);
        anyhow::ensure!(stored.len() == parts.len(), "part count mismatch");
        let data = stored.iter().flat_map(|(_, b)| b.to_vec()).collect();
        self.objects.lock().unwrap().push((location.clone(), data));
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        _location: &ObjectLocation,
        _upload_id: &str,
    ) -> anyhow::Result<()> {
        *self.aborted.lock().unwrap() = true;
        Ok(())
    }
}

/// Job service double: hands out statuses from a script, one per query.
#[derive(Default)]
pub struct ScriptedJobs {
    pub script: Mutex<VecDeque<Result<JobStatus, PipelineError>>>,
    pub submitted: Mutex<Vec<String>>,
    pub queries: Mutex<u32>,
    pub reject_submission: Option<u16>,
}

impl ScriptedJobs {
    pub fn new(script: Vec<JobStatus>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    pub fn rejecting(status: u16) -> Self {
        Self {
            reject_submission: Some(status),
            ..Self::default()
        }
    }
}

#[async_trait]
impl JobApi for ScriptedJobs {
    async fn submit(
        &self,
        resource_location: &str,
        _options: &CutoutOptions,
        _credentials: &JobCredentials,
    ) -> Result<JobHandle, PipelineError> {
        if let Some(status) = self.reject_submission {
            return Err(PipelineError::Submission {
                status: Some(status),
                body: "{\"error\":\"invalid api key\"}".to_string(),
            });
        }
        self.submitted
            .lock()
            .unwrap()
            .push(resource_location.to_string());
        Ok(JobHandle::new("job-1"))
    }

    async fn status(
        &self,
        handle: &JobHandle,
        _credentials: &JobCredentials,
    ) -> Result<JobStatus, PipelineError> {
        *self.queries.lock().unwrap() += 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PipelineError::poll_query(&handle.id, "script exhausted")))
    }
}

/// Config with a short poll delay so tests that do poll finish quickly.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        poll_delay_ms: 10,
        poll_max_attempts: 5,
        service_api_key: None,
        ..PipelineConfig::development()
    }
}

pub fn test_state(store: Arc<MemoryStore>, jobs: Arc<ScriptedJobs>) -> AppState {
    let config = test_config();
    let orchestrator = build_orchestrator(&config, store, jobs).unwrap();
    AppState {
        orchestrator: Arc::new(orchestrator),
        config,
    }
}

pub fn test_app(store: Arc<MemoryStore>, jobs: Arc<ScriptedJobs>) -> Router {
    create_app(test_state(store, jobs))
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
