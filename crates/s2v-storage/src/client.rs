//! OSS client implementation.

use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

/// Configuration for the OSS client.
#[derive(Debug, Clone)]
pub struct OssConfig {
    /// S3 API endpoint URL of the OSS provider
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for S3-compatible providers)
    pub region: String,
    /// Public base URL for the bucket; when absent, uploads return a
    /// presigned GET URL instead
    pub public_base_url: Option<String>,
    /// Presigned URL lifetime
    pub url_expiry: Duration,
}

impl OssConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("OSS_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("OSS_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("OSS_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("OSS_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("OSS_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("OSS_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("OSS_BUCKET")
                .map_err(|_| StorageError::config_error("OSS_BUCKET not set"))?,
            region: std::env::var("OSS_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base_url: std::env::var("OSS_PUBLIC_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            url_expiry: Duration::from_secs(
                std::env::var("OSS_URL_EXPIRES_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(86_400),
            ),
        })
    }
}

/// S3-compatible OSS storage client.
#[derive(Clone)]
pub struct OssClient {
    client: Client,
    bucket: String,
    public_base_url: Option<String>,
    url_expiry: Duration,
}

impl OssClient {
    /// Create a new OSS client from configuration.
    pub fn new(config: OssConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "oss",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_base_url: config.public_base_url.map(|s| s.trim_end_matches('/').to_string()),
            url_expiry: config.url_expiry,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(OssConfig::from_env()?))
    }

    /// Upload a file and return a caller-facing URL for it.
    pub async fn upload_file(
        &self,
        key: &str,
        path: impl AsRef<Path>,
        content_type: &str,
    ) -> StorageResult<String> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        self.url_for(key).await
    }

    /// Download object as bytes.
    pub async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    /// Download object to a file.
    pub async fn download_file(&self, key: &str, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        let bytes = self.download_bytes(key).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;

        info!("Downloaded {} to {}", key, path.display());
        Ok(())
    }

    /// Caller-facing URL for an uploaded object: the public base URL
    /// when configured, otherwise a presigned GET.
    async fn url_for(&self, key: &str) -> StorageResult<String> {
        if let Some(base) = &self.public_base_url {
            return Ok(format!("{base}/{key}"));
        }
        match self.presign_get(key, self.url_expiry).await {
            Ok(url) => Ok(url),
            Err(e) => {
                warn!("Presigning {} failed: {}", key, e);
                Err(e)
            }
        }
    }

    /// Generate a presigned GET URL.
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}
