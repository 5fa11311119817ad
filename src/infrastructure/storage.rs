use crate::config::PipelineConfig;
use crate::services::storage::S3ObjectStore;
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &PipelineConfig) -> Arc<S3ObjectStore> {
    let mut loader = aws_config::from_env().region(Region::new(config.region.clone()));

    if let Some(endpoint_url) = &config.s3_endpoint {
        info!("☁️  S3 Storage: {} (Region: {})", endpoint_url, config.region);
        loader = loader.endpoint_url(endpoint_url);
    } else {
        info!("☁️  S3 Storage: AWS (Region: {})", config.region);
    }

    // Static keys win; otherwise the default AWS provider chain applies.
    if let (Some(access_key), Some(secret_key)) =
        (&config.aws_access_key_id, &config.aws_secret_access_key)
    {
        loader = loader.credentials_provider(Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "static",
        ));
    }

    let aws_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(config.s3_force_path_style)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);
    Arc::new(S3ObjectStore::new(s3_client, config.region.clone()))
}
