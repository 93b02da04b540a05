use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::StorageConfig;

/// Lifetime of a presigned upload URL.
const UPLOAD_URL_TTL: Duration = Duration::from_secs(600);

/// Prefix under which all site media is stored.
const MEDIA_PREFIX: &str = "media";

#[derive(Debug, Error)]
#[error("storage error: {0}")]
pub struct StorageError(pub String);

/// StorageService
///
/// Object storage for portfolio and blog images. Implemented by the S3 client
/// (MinIO locally, Supabase Storage in production) and by an in-memory mock.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the bucket if it is missing. Only called for local MinIO.
    async fn ensure_bucket_exists(&self);

    /// A short-lived URL the admin's browser can `PUT` the file to directly.
    /// The upload must carry `content_type`.
    async fn presigned_upload_url(&self, key: &str, content_type: &str) -> Result<String, StorageError>;
}

pub type StorageState = Arc<dyn StorageService>;

/// S3StorageClient
///
/// Path-style addressing is forced; MinIO and the Supabase S3 gateway both need it.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = s3::config::Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "static",
        );

        let s3_config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(&config.endpoint)
            .region(s3::config::Region::new(config.region.clone()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(s3_config),
            bucket_name: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // Fails harmlessly when the bucket already exists.
        if let Err(err) = self.client.create_bucket().bucket(&self.bucket_name).send().await {
            tracing::debug!(bucket = %self.bucket_name, "create_bucket: {}", err);
        }
    }

    async fn presigned_upload_url(&self, key: &str, content_type: &str) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(UPLOAD_URL_TTL).map_err(|e| StorageError(e.to_string()))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError(e.to_string()))?;

        Ok(request.uri().to_string())
    }
}

/// media_key
///
/// A fresh object key for an uploaded file: `media/<uuid>.<ext>`, keeping only
/// a short alphanumeric extension from the client's filename.
pub fn media_key(filename: &str) -> String {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(str::to_ascii_lowercase)
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.bytes().all(|b| b.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    format!("{MEDIA_PREFIX}/{}.{}", Uuid::new_v4(), extension)
}

/// MockStorageService
///
/// In-memory stand-in used by the tests.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, every operation fails.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn presigned_upload_url(&self, key: &str, _content_type: &str) -> Result<String, StorageError> {
        if self.should_fail {
            return Err(StorageError("simulated storage outage".to_string()));
        }
        Ok(format!("http://localhost:9000/mock-bucket/{key}?signature=fake"))
    }
}
