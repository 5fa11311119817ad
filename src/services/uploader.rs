use crate::services::error::PipelineError;
use crate::services::storage::{ObjectLocation, ObjectSettings, ObjectStore};
use crate::utils::object_key::{public_url_of, resolve_content_type, resolve_key, storage_uri_of};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

/// Stage a remote file into a bucket. Field names follow the JSON the
/// `/upload-url-to-s3` endpoint accepts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub url: Option<String>,
    pub bucket: Option<String>,
    pub key: Option<String>,
    pub region: Option<String>,
    #[serde(default, rename = "public")]
    pub make_public: bool,
    pub content_type: Option<String>,
    #[serde(default)]
    pub cache_seconds: u64,
    #[serde(default)]
    pub sse: bool,
    pub timeout_ms: Option<u64>,
}

impl UploadRequest {
    pub fn new(url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            bucket: Some(bucket.into()),
            ..Self::default()
        }
    }

    /// Source URL and bucket, or a client error naming whichever is absent.
    pub fn required(&self) -> Result<(&str, &str), PipelineError> {
        let url = self.url.as_deref().map(str::trim).filter(|v| !v.is_empty());
        let bucket = self.bucket.as_deref().map(str::trim).filter(|v| !v.is_empty());
        match (url, bucket) {
            (Some(url), Some(bucket)) => Ok((url, bucket)),
            (url, bucket) => {
                let mut missing = Vec::new();
                if url.is_none() {
                    missing.push("url");
                }
                if bucket.is_none() {
                    missing.push("bucket");
                }
                Err(PipelineError::missing(missing))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub ok: bool,
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub s3_uri: String,
    pub public_url: Option<String>,
    pub size: u64,
    pub parts: usize,
}

impl UploadResult {
    /// Location a downstream job should read from.
    pub fn location(&self) -> &str {
        self.public_url.as_deref().unwrap_or(&self.s3_uri)
    }
}

type PartOutcome = Result<(i32, String), PipelineError>;

/// Pipes a remote HTTP body into a multipart upload. At most
/// `queue_size` parts of `part_size` bytes are held at once.
pub struct StreamingUploader {
    http: reqwest::Client,
    store: Arc<dyn ObjectStore>,
    part_size: usize,
    queue_size: usize,
    fetch_timeout: Duration,
    default_region: String,
}

impl StreamingUploader {
    pub fn new(
        http: reqwest::Client,
        store: Arc<dyn ObjectStore>,
        part_size: usize,
        queue_size: usize,
        fetch_timeout: Duration,
        default_region: String,
    ) -> Self {
        Self {
            http,
            store,
            part_size: part_size.max(1),
            queue_size: queue_size.max(1),
            fetch_timeout,
            default_region,
        }
    }

    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadResult, PipelineError> {
        let (url, bucket) = request.required()?;
        let key = request
            .key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| resolve_key(url));
        let timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.fetch_timeout);

        info!("⬇️  Fetching {} (timeout {:?})", url, timeout);
        let response = self.fetch(url, timeout).await?;

        let fetched_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_type =
            resolve_content_type(request.content_type.as_deref(), fetched_type.as_deref(), &key);

        let location = ObjectLocation {
            bucket: bucket.to_string(),
            key: key.clone(),
            region: request.region.clone().filter(|r| !r.is_empty()),
        };
        let settings = ObjectSettings::new(
            content_type.clone(),
            request.make_public,
            request.cache_seconds,
            request.sse,
        );

        info!(
            "☁️  Streaming into s3://{}/{} ({}, public={})",
            bucket, key, content_type, request.make_public
        );
        let (size, parts) = self
            .pipe(url, response.bytes_stream(), timeout, &location, &settings)
            .await?;
        info!("✅ Stored {} bytes in {} part(s) at s3://{}/{}", size, parts, bucket, key);

        let region = location.region.as_deref().unwrap_or(&self.default_region);
        Ok(UploadResult {
            ok: true,
            bucket: bucket.to_string(),
            s3_uri: storage_uri_of(bucket, &key),
            public_url: request
                .make_public
                .then(|| public_url_of(bucket, &key, Some(region))),
            key,
            content_type,
            size,
            parts,
        })
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, PipelineError> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| fetch_error(url, e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(url, format!("status {}", status)));
        }
        // These statuses never carry a body, so there is nothing to store.
        if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT) {
            return Err(PipelineError::fetch(url, format!("status {}: no body", status)));
        }
        Ok(response)
    }

    /// Create the multipart upload, feed it from `body`, then complete it.
    /// Any failure after creation aborts the upload so no parts linger.
    async fn pipe<S, E>(
        &self,
        source: &str,
        body: S,
        timeout: Duration,
        location: &ObjectLocation,
        settings: &ObjectSettings,
    ) -> Result<(u64, usize), PipelineError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: StreamError,
    {
        let upload_id = self
            .store
            .create_multipart_upload(location, settings)
            .await
            .map_err(|e| PipelineError::storage("create_multipart_upload", e))?;
        debug!("Multipart upload {} created for {}", upload_id, location.key);

        let (size, parts) = match self.send_parts(source, body, timeout, location, &upload_id).await {
            Ok(sent) => sent,
            Err(e) => {
                self.abort(location, &upload_id).await;
                return Err(e);
            }
        };

        let count = parts.len();
        if let Err(e) = self
            .store
            .complete_multipart_upload(location, &upload_id, parts)
            .await
        {
            self.abort(location, &upload_id).await;
            return Err(PipelineError::storage("complete_multipart_upload", e));
        }
        Ok((size, count))
    }

    async fn send_parts<S, E>(
        &self,
        source: &str,
        body: S,
        timeout: Duration,
        location: &ObjectLocation,
        upload_id: &str,
    ) -> Result<(u64, Vec<(i32, String)>), PipelineError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: StreamError,
    {
        let mut body = std::pin::pin!(body);
        let mut in_flight: JoinSet<PartOutcome> = JoinSet::new();
        let mut completed = Vec::new();
        let mut buffer = BytesMut::with_capacity(self.part_size);
        let mut part_number: i32 = 0;
        let mut total: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| stream_error(source, e, timeout))?;
            total += chunk.len() as u64;
            buffer.extend_from_slice(&chunk);

            while buffer.len() >= self.part_size {
                let part = buffer.split_to(self.part_size).freeze();
                part_number += 1;
                self.wait_for_slot(&mut in_flight, &mut completed).await?;
                self.spawn_part(&mut in_flight, location, upload_id, part_number, part);
            }
        }

        // The store needs at least one part, even for an empty body.
        if !buffer.is_empty() || part_number == 0 {
            part_number += 1;
            self.wait_for_slot(&mut in_flight, &mut completed).await?;
            self.spawn_part(&mut in_flight, location, upload_id, part_number, buffer.freeze());
        }

        while let Some(joined) = in_flight.join_next().await {
            completed.push(flatten_part(joined)?);
        }

        completed.sort_by_key(|(number, _)| *number);
        Ok((total, completed))
    }

    async fn wait_for_slot(
        &self,
        in_flight: &mut JoinSet<PartOutcome>,
        completed: &mut Vec<(i32, String)>,
    ) -> Result<(), PipelineError> {
        while in_flight.len() >= self.queue_size {
            match in_flight.join_next().await {
                Some(joined) => completed.push(flatten_part(joined)?),
                None => break,
            }
        }
        Ok(())
    }

    fn spawn_part(
        &self,
        in_flight: &mut JoinSet<PartOutcome>,
        location: &ObjectLocation,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) {
        let store = Arc::clone(&self.store);
        let location = location.clone();
        let upload_id = upload_id.to_string();
        debug!("Uploading part {} ({} bytes)", part_number, data.len());
        in_flight.spawn(async move {
            let etag = store
                .upload_part(&location, &upload_id, part_number, data)
                .await
                .map_err(|e| PipelineError::storage("upload_part", e))?;
            Ok((part_number, etag))
        });
    }

    async fn abort(&self, location: &ObjectLocation, upload_id: &str) {
        if let Err(e) = self.store.abort_multipart_upload(location, upload_id).await {
            warn!("Failed to abort multipart upload {}: {}", upload_id, e);
        }
    }
}

/// Errors a source body stream can yield.
pub trait StreamError: Display {
    fn is_timeout(&self) -> bool {
        false
    }
}

impl StreamError for reqwest::Error {
    fn is_timeout(&self) -> bool {
        reqwest::Error::is_timeout(self)
    }
}

impl StreamError for std::io::Error {
    fn is_timeout(&self) -> bool {
        self.kind() == std::io::ErrorKind::TimedOut
    }
}

fn fetch_error(url: &str, err: impl StreamError, timeout: Duration) -> PipelineError {
    if err.is_timeout() {
        PipelineError::fetch(url, format!("timed out after {:?}", timeout))
    } else {
        PipelineError::fetch(url, err)
    }
}

fn stream_error(url: &str, err: impl StreamError, timeout: Duration) -> PipelineError {
    if err.is_timeout() {
        PipelineError::fetch(url, format!("body read timed out after {:?}", timeout))
    } else {
        PipelineError::fetch(url, format!("body read failed: {}", err))
    }
}

fn flatten_part(joined: Result<PartOutcome, JoinError>) -> PartOutcome {
    joined.map_err(|e| PipelineError::storage("upload_part", e))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[derive(Default)]
    struct RecordingStore {
        settings: Mutex<Option<ObjectSettings>>,
        parts: Mutex<Vec<(i32, Bytes)>>,
        completed: Mutex<Option<Vec<(i32, String)>>>,
        aborted: Mutex<bool>,
        fail_part: Option<i32>,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn create_multipart_upload(
            &self,
            _location: &ObjectLocation,
            settings: &ObjectSettings,
        ) -> anyhow::Result<String> {
            *self.settings.lock().unwrap() = Some(settings.clone());
            Ok("upload-1".to_string())
        }

        async fn upload_part(
            &self,
            _location: &ObjectLocation,
            _upload_id: &str,
            part_number: i32,
            data: Bytes,
        ) -> anyhow::Result<String> {
            if self.fail_part == Some(part_number) {
                return Err(anyhow::anyhow!("AccessDenied"));
            }
            // Later parts finish first to exercise ordering on completion.
            tokio::time::sleep(Duration::from_millis(10 * (5 - part_number.min(5)) as u64)).await;
            self.parts.lock().unwrap().push((part_number, data));
            Ok(format!("etag-{}", part_number))
        }

        async fn complete_multipart_upload(
            &self,
            _location: &ObjectLocation,
            _upload_id: &str,
            parts: Vec<(i32, String)>,
        ) -> anyhow::Result<()> {
            *self.completed.lock().unwrap() = Some(parts);
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

    fn uploader(store: Arc<RecordingStore>, part_size: usize, queue_size: usize) -> StreamingUploader {
        StreamingUploader::new(
            reqwest::Client::new(),
            store,
            part_size,
            queue_size,
            Duration::from_secs(30),
            "us-east-1".to_string(),
        )
    }

    fn location() -> ObjectLocation {
        ObjectLocation {
            bucket: "uploads".to_string(),
            key: "cat.png".to_string(),
            region: None,
        }
    }

    fn chunks(data: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(
            data.iter()
                .map(|c| Ok(Bytes::from_static(*c)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_pipe_splits_into_ordered_parts() {
        let store = Arc::new(RecordingStore::default());
        let up = uploader(store.clone(), 4, 2);

        let (size, parts) = up
            .pipe("http://src", chunks(&[b"abc", b"defgh", b"ij", b"klmno"]), TIMEOUT, &location(), &ObjectSettings::default())
            .await
            .unwrap();

        assert_eq!(size, 15);
        assert_eq!(parts, 4);
        let completed = store.completed.lock().unwrap().clone().unwrap();
        let numbers: Vec<i32> = completed.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(completed[0].1, "etag-1");

        let mut stored = store.parts.lock().unwrap().clone();
        stored.sort_by_key(|(n, _)| *n);
        let joined: Vec<u8> = stored.iter().flat_map(|(_, b)| b.to_vec()).collect();
        assert_eq!(joined, b"abcdefghijklmno");
        assert!(stored[..3].iter().all(|(_, b)| b.len() == 4));
        assert!(!*store.aborted.lock().unwrap());
    }

    #[tokio::test]
    async fn test_pipe_empty_body_sends_one_part() {
        let store = Arc::new(RecordingStore::default());
        let up = uploader(store.clone(), 4, 4);

        let (size, parts) = up
            .pipe("http://src", chunks(&[]), TIMEOUT, &location(), &ObjectSettings::default())
            .await
            .unwrap();

        assert_eq!((size, parts), (0, 1));
        assert_eq!(store.parts.lock().unwrap()[0].1.len(), 0);
    }

    #[tokio::test]
    async fn test_pipe_aborts_when_part_rejected() {
        let store = Arc::new(RecordingStore {
            fail_part: Some(2),
            ..RecordingStore::default()
        });
        let up = uploader(store.clone(), 2, 1);

        let err = up
            .pipe("http://src", chunks(&[b"aabbcc"]), TIMEOUT, &location(), &ObjectSettings::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Storage { operation: "upload_part", .. }));
        assert!(*store.aborted.lock().unwrap());
        assert!(store.completed.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pipe_aborts_on_source_error() {
        let store = Arc::new(RecordingStore::default());
        let up = uploader(store.clone(), 4, 2);
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"abcdef")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);

        let err = up
            .pipe("http://src/cat.png", body, TIMEOUT, &location(), &ObjectSettings::default())
            .await
            .unwrap_err();

        match err {
            PipelineError::Fetch { url, reason } => {
                assert_eq!(url, "http://src/cat.png");
                assert!(reason.contains("reset"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(*store.aborted.lock().unwrap());
    }

    #[tokio::test]
    async fn test_upload_rejects_missing_fields_before_fetching() {
        let store = Arc::new(RecordingStore::default());
        let up = uploader(store.clone(), 4, 2);

        let err = up.upload(&UploadRequest::default()).await.unwrap_err();
        match err {
            PipelineError::ClientInput { missing, .. } => assert_eq!(missing, vec!["url", "bucket"]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.settings.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_body_timeout_reports_effective_timeout() {
        let store = Arc::new(RecordingStore::default());
        let up = uploader(store.clone(), 4, 2);
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow")),
        ]);

        let err = up
            .pipe("http://src/cat.png", body, Duration::from_millis(250), &location(), &ObjectSettings::default())
            .await
            .unwrap_err();

        match err {
            PipelineError::Fetch { reason, .. } => {
                assert_eq!(reason, "body read timed out after 250ms");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(*store.aborted.lock().unwrap());
    }

    /// Counts `upload_part` calls running at the same time.
    #[derive(Default)]
    struct GaugeStore {
        current: AtomicUsize,
        peak: AtomicUsize,
        uploaded: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for GaugeStore {
        async fn create_multipart_upload(
            &self,
            _location: &ObjectLocation,
            _settings: &ObjectSettings,
        ) -> anyhow::Result<String> {
            Ok("upload-gauge".to_string())
        }

        async fn upload_part(
            &self,
            _location: &ObjectLocation,
            _upload_id: &str,
            part_number: i32,
            _data: Bytes,
        ) -> anyhow::Result<String> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.uploaded.fetch_add(1, Ordering::SeqCst);
            Ok(format!("etag-{}", part_number))
        }

        async fn complete_multipart_upload(
            &self,
            _location: &ObjectLocation,
            _upload_id: &str,
            _parts: Vec<(i32, String)>,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn abort_multipart_upload(
            &self,
            _location: &ObjectLocation,
            _upload_id: &str,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_parts_in_flight_never_exceed_queue_size() {
        let store = Arc::new(GaugeStore::default());
        let up = StreamingUploader::new(
            reqwest::Client::new(),
            store.clone(),
            2,
            3,
            TIMEOUT,
            "us-east-1".to_string(),
        );
        let data: Vec<&'static [u8]> = vec![b"ab"; 20];

        let (size, parts) = up
            .pipe("http://src", chunks(&data), TIMEOUT, &location(), &ObjectSettings::default())
            .await
            .unwrap();

        assert_eq!((size, parts), (40, 20));
        assert_eq!(store.uploaded.load(Ordering::SeqCst), 20);
        let peak = store.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak in-flight parts was {}", peak);
    }

    #[test]
    fn test_upload_result_location_prefers_public_url() {
        let mut result = UploadResult {
            ok: true,
            bucket: "b".to_string(),
            key: "k.png".to_string(),
            content_type: "image/png".to_string(),
            s3_uri: "s3://b/k.png".to_string(),
            public_url: None,
            size: 1,
            parts: 1,
        };
        assert_eq!(result.location(), "s3://b/k.png");
        result.public_url = Some("https://b.s3.amazonaws.com/k.png".to_string());
        assert_eq!(result.location(), "https://b.s3.amazonaws.com/k.png");
    }
}
