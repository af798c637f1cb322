//! Blob store access for the policy source document.
//!
//! The document lives in an S3-compatible bucket. [`HttpObjectStore`] reads it
//! with a path-style GET; [`FsObjectStore`] reads the same `bucket/key` layout
//! from a local directory for offline work.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::StoreError;

/// Read-only access to objects by bucket and key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;
}

/// Fetch an object and decode it as UTF-8 text.
pub async fn source_text(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
) -> Result<String, StoreError> {
    let bytes = store.get_object(bucket, key).await?;
    String::from_utf8(bytes)
        .map_err(|e| StoreError::Other(format!("{bucket}/{key} is not valid UTF-8: {e}")))
}

/// S3-compatible object store reached over plain HTTP(S).
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpObjectStore {
    /// `endpoint` should be like `https://s3.ap-northeast-2.amazonaws.com`
    /// (no trailing slash needed).
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            bucket.trim_matches('/'),
            key.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.object_url(bucket, key);
        info!(url = %url, "fetching object");

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(format!("{bucket}/{key}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        info!(bytes = bytes.len(), "fetched object");
        Ok(bytes.to_vec())
    }
}

/// Object store backed by a local directory laid out as `root/bucket/key`.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(bucket).join(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::Other(format!(
                "object path {bucket}/{key} must stay inside the store root"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("{bucket}/{key}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}
