use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, ObjectCannedAcl, ServerSideEncryption,
};
use bytes::Bytes;
use dashmap::DashMap;

/// Where an object lands. `region` overrides the store's default region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
    pub region: Option<String>,
}

/// Headers applied when the multipart upload is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSettings {
    pub content_type: String,
    pub public_read: bool,
    pub cache_control: Option<String>,
    pub server_side_encryption: bool,
}

impl ObjectSettings {
    /// Build settings from request flags. A zero cache lifetime sets no
    /// `Cache-Control` header at all.
    pub fn new(content_type: String, public_read: bool, cache_seconds: u64, sse: bool) -> Self {
        Self {
            content_type,
            public_read,
            cache_control: (cache_seconds > 0).then(|| format!("public, max-age={}", cache_seconds)),
            server_side_encryption: sse,
        }
    }
}

/// Multipart write surface of an object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn create_multipart_upload(
        &self,
        location: &ObjectLocation,
        settings: &ObjectSettings,
    ) -> Result<String>;

    /// Returns the part's ETag.
    async fn upload_part(
        &self,
        location: &ObjectLocation,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String>;

    async fn complete_multipart_upload(
        &self,
        location: &ObjectLocation,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<()>;

    async fn abort_multipart_upload(&self, location: &ObjectLocation, upload_id: &str)
    -> Result<()>;
}

pub struct S3ObjectStore {
    client: Client,
    default_region: String,
    /// Clients for regions other than the default, built on first use.
    regional: DashMap<String, Client>,
}

impl S3ObjectStore {
    pub fn new(client: Client, default_region: String) -> Self {
        Self {
            client,
            default_region,
            regional: DashMap::new(),
        }
    }

    fn client_for(&self, location: &ObjectLocation) -> Client {
        match location.region.as_deref() {
            Some(region) if !region.is_empty() && region != self.default_region => self
                .regional
                .entry(region.to_string())
                .or_insert_with(|| {
                    let config = self
                        .client
                        .config()
                        .to_builder()
                        .region(Region::new(region.to_string()))
                        .build();
                    Client::from_conf(config)
                })
                .clone(),
            _ => self.client.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn create_multipart_upload(
        &self,
        location: &ObjectLocation,
        settings: &ObjectSettings,
    ) -> Result<String> {
        let mut request = self
            .client_for(location)
            .create_multipart_upload()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_type(&settings.content_type);

        if settings.public_read {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }
        if let Some(cache_control) = &settings.cache_control {
            request = request.cache_control(cache_control);
        }
        if settings.server_side_encryption {
            request = request.server_side_encryption(ServerSideEncryption::Aes256);
        }

        let res = request.send().await?;
        res.upload_id()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("No upload ID"))
    }

    async fn upload_part(
        &self,
        location: &ObjectLocation,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let res = self
            .client_for(location)
            .upload_part()
            .bucket(&location.bucket)
            .key(&location.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await?;

        Ok(res.e_tag().unwrap_or_default().to_string())
    }

    async fn complete_multipart_upload(
        &self,
        location: &ObjectLocation,
        upload_id: &str,
        parts: Vec<(i32, String)>,
    ) -> Result<()> {
        let completed_parts = parts
            .into_iter()
            .map(|(part_number, etag)| {
                CompletedPart::builder()
                    .e_tag(etag)
                    .part_number(part_number)
                    .build()
            })
            .collect();

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client_for(location)
            .complete_multipart_upload()
            .bucket(&location.bucket)
            .key(&location.key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        location: &ObjectLocation,
        upload_id: &str,
    ) -> Result<()> {
        let res = self
            .client_for(location)
            .abort_multipart_upload()
            .bucket(&location.bucket)
            .key(&location.key)
            .upload_id(upload_id)
            .send()
            .await;

        if let Err(e) = res {
            tracing::error!(
                "S3 abort_multipart_upload failed: bucket={}, key={}, upload_id={}, error={:?}",
                location.bucket,
                location.key,
                upload_id,
                e
            );
            return Err(e.into());
        }
        Ok(())
    }
}
