// dbbackup/src/backup/s3_upload.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use std::path::Path;

use crate::config::S3Config;

/// Minimal "put object" capability. The bucket is chosen per call because a
/// single run may target any bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, file_path: &Path) -> Result<()>;
}

/// S3-compatible object storage (AWS, DigitalOcean Spaces, MinIO).
pub struct S3ObjectStore {
    client: s3::Client,
}

impl S3ObjectStore {
    pub async fn connect(s3_config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest());
        if let Some(endpoint) = &s3_config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some(region) = &s3_config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some((access_key_id, secret_access_key)) = &s3_config.static_credentials {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                access_key_id,
                secret_access_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        }
        let sdk_config = loader.load().await;

        Self { client: s3::Client::new(&sdk_config) }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, bucket: &str, key: &str, file_path: &Path) -> Result<()> {
        tracing::info!(
            bucket,
            key,
            path = %file_path.display(),
            "uploading dump to object storage"
        );

        let body = ByteStream::from_path(file_path)
            .await
            .with_context(|| format!("Failed to create ByteStream from file: {}", file_path.display()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to upload file {} to S3 bucket {} with key {}",
                    file_path.display(),
                    bucket,
                    key
                )
            })?;

        tracing::info!(bucket, key, "✅ uploaded to object storage");
        Ok(())
    }
}
