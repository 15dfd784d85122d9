//! S3-compatible segment store.
//!
//! Thin adapter from [`SegmentStore`] to the `object_store` crate's
//! `AmazonS3` client. Works against AWS S3 and S3-compatible endpoints
//! (`MinIO`, `LocalStack`) via a custom endpoint URL.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::debug;

use crate::error::StoreError;
use crate::store::{SegmentStore, StoredObject};

/// Connection settings for an S3-compatible store.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    /// Bucket name.
    pub bucket: String,
    /// Region (ignored by most S3-compatible stores, required by AWS).
    pub region: String,
    /// Custom endpoint URL for S3-compatible stores. `None` = AWS.
    pub endpoint: Option<String>,
    /// Access key ID. `None` = resolve from the environment.
    pub access_key_id: Option<String>,
    /// Secret access key. `None` = resolve from the environment.
    pub secret_access_key: Option<String>,
    /// Allow plain-HTTP endpoints (local test stores).
    pub allow_http: bool,
}

impl S3Config {
    /// Creates a config for the given bucket and region.
    #[must_use]
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            ..Self::default()
        }
    }

    /// Sets a custom endpoint URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets static credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Permits plain-HTTP endpoints.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

/// [`SegmentStore`] backed by an S3-compatible object store.
pub struct S3SegmentStore {
    inner: Arc<dyn ObjectStore>,
    bucket: String,
}

impl S3SegmentStore {
    /// Builds a store from connection settings.
    ///
    /// Credentials not set explicitly are resolved from the standard AWS
    /// environment variables by `object_store`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the client cannot be constructed.
    pub fn connect(config: &S3Config) -> Result<Self, StoreError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_allow_http(config.allow_http);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let (Some(id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder.with_access_key_id(id).with_secret_access_key(secret);
        }

        Ok(Self {
            inner: Arc::new(builder.build()?),
            bucket: config.bucket.clone(),
        })
    }

    /// Wraps an existing `object_store` client.
    #[must_use]
    pub fn from_client(inner: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            inner,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl SegmentStore for S3SegmentStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        let path = ObjectPath::from(key);
        let size = bytes.len();
        self.inner.put(&path, PutPayload::from(bytes)).await?;
        debug!(key, size, "object uploaded");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = ObjectPath::from(key);
        let result = self.inner.get(&path).await?;
        Ok(result.bytes().await?)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError> {
        let path = ObjectPath::from(prefix.trim_end_matches('/'));
        let metas: Vec<_> = self.inner.list(Some(&path)).try_collect().await?;
        Ok(metas
            .into_iter()
            .map(|m| StoredObject {
                key: m.location.to_string(),
                last_modified: m.last_modified,
                size_bytes: m.size as u64,
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = ObjectPath::from(key);
        match self.inner.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_container(&self) -> Result<(), StoreError> {
        // One-object listing doubles as a reachability and existence probe.
        use futures::StreamExt;
        let mut stream = self.inner.list(None);
        match stream.next().await {
            None | Some(Ok(_)) => Ok(()),
            Some(Err(e)) => Err(StoreError::ContainerUnavailable(
                self.bucket.clone(),
                e.to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for S3SegmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3SegmentStore")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}
