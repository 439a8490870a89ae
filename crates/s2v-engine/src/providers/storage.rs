//! Media storage adapter over the object store client.

use std::path::Path;

use reqwest::Client;
use tracing::debug;

use s2v_storage::OssClient;

use super::{MediaStorage, ProviderError, ProviderResult};

/// Uploads artifacts to the object store and fetches remote artifacts
/// over plain HTTP.
pub struct OssMediaStorage {
    oss: OssClient,
    http: Client,
}

impl OssMediaStorage {
    pub fn new(oss: OssClient) -> Self {
        Self {
            oss,
            http: Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl MediaStorage for OssMediaStorage {
    async fn upload(&self, key: &str, path: &Path, content_type: &str) -> ProviderResult<String> {
        self.oss
            .upload_file(key, path, content_type)
            .await
            .map_err(|e| ProviderError::transient(format!("upload {key}: {e}")))
    }

    async fn download_url(&self, url: &str, dest: &Path) -> ProviderResult<()> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::transient(format!(
                "download {url} failed with HTTP {status}"
            )));
        }
        let bytes = response.bytes().await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProviderError::transient(format!("create download dir: {e}")))?;
        }
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ProviderError::transient(format!("write download: {e}")))?;
        debug!(url = url, bytes = bytes.len(), "Artifact downloaded");
        Ok(())
    }
}
