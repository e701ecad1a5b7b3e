//! `BucketStore` - the [`ObjectStore`](crate::ObjectStore) implementation.
//!
//! Wraps any `object_store` backend (S3-compatible services, the local
//! filesystem, or memory for tests) behind the remotefs key model: callers
//! speak relative keys, the adapter prepends the configured bucket prefix
//! and reconstructs one directory level per listing from delimiter queries.

use std::sync::Arc;

use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{DynObjectStore, ObjectMeta, ObjectStore as _};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::{FileMeta, ObjectStore, StoreError};

/// Connection settings for an S3-compatible backend.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub bucket: String,
    /// Key prefix acting as the virtual root inside the bucket.
    pub prefix: String,
    pub region: String,
    /// Optional S3-compatible endpoint (MinIO, Ceph, ...).
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Flat-key store adapter with a configured root prefix.
#[derive(Debug, Clone)]
pub struct BucketStore {
    backend: Arc<DynObjectStore>,
    prefix: String,
}

impl BucketStore {
    /// Wrap an existing backend. `prefix` is normalized: surrounding slashes
    /// are stripped and the empty string means the bucket root.
    pub fn with_backend(backend: Arc<DynObjectStore>, prefix: &str) -> Self {
        Self {
            backend,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Connect to an S3-compatible service.
    ///
    /// Credentials and region fall back to the usual AWS environment
    /// variables when not set explicitly.
    pub fn open_s3(cfg: &S3Config) -> Result<Self, StoreError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&cfg.bucket)
            .with_region(&cfg.region);
        if let Some(endpoint) = &cfg.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let (Some(access_key), Some(secret_key)) = (&cfg.access_key, &cfg.secret_key) {
            builder = builder
                .with_access_key_id(access_key)
                .with_secret_access_key(secret_key);
        }
        let backend = builder
            .build()
            .map_err(|e| StoreError::Backend(Box::new(e)))?;
        Ok(Self::with_backend(Arc::new(backend), &cfg.prefix))
    }

    /// Serve objects from a directory on the local filesystem.
    pub fn local(root: &std::path::Path, prefix: &str) -> Result<Self, StoreError> {
        let backend = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| StoreError::Backend(Box::new(e)))?;
        Ok(Self::with_backend(Arc::new(backend), prefix))
    }

    /// Translate a relative key into the fully qualified backend key.
    fn full_key(&self, rel: &str) -> String {
        let rel = rel.trim_matches('/');
        if self.prefix.is_empty() {
            rel.to_string()
        } else if rel.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}/{}", self.prefix, rel)
        }
    }

    fn object_meta(&self, rel: &str, meta: &ObjectMeta) -> FileMeta {
        FileMeta {
            path: rel.to_string(),
            size: meta.size,
            etag: meta.e_tag.clone().unwrap_or_default(),
            last_modified: Some(meta.last_modified),
            is_dir: false,
        }
    }
}

fn join_rel(rel: &str, name: &str) -> String {
    if rel.is_empty() {
        name.to_string()
    } else {
        format!("{rel}/{name}")
    }
}

fn backend_err(e: object_store::Error) -> StoreError {
    StoreError::Backend(Box::new(e))
}

#[async_trait::async_trait]
impl ObjectStore for BucketStore {
    async fn head(&self, key: &str) -> Result<FileMeta, StoreError> {
        let location = ObjectPath::from(self.full_key(key));
        match self.backend.head(&location).await {
            Ok(meta) => Ok(self.object_meta(key, &meta)),
            Err(object_store::Error::NotFound { .. }) => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(backend_err(e)),
        }
    }

    async fn list(&self, key: &str) -> Result<Vec<FileMeta>, StoreError> {
        let prefix_key = self.full_key(key);
        let prefix = (!prefix_key.is_empty()).then(|| ObjectPath::from(prefix_key.as_str()));
        let result = match self.backend.list_with_delimiter(prefix.as_ref()).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(backend_err(e)),
        };

        let mut out = Vec::with_capacity(result.common_prefixes.len() + result.objects.len());
        for common in &result.common_prefixes {
            if let Some(name) = common.filename() {
                out.push(FileMeta::dir(join_rel(key, name)));
            }
        }
        for object in &result.objects {
            // A zero-byte marker object at the prefix itself is not a child.
            if object.location.as_ref() == prefix_key {
                continue;
            }
            if let Some(name) = object.location.filename() {
                out.push(self.object_meta(&join_rel(key, name), object));
            }
        }
        debug!(key, entries = out.len(), "listed prefix");
        Ok(out)
    }

    async fn download(
        &self,
        key: &str,
        dst: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StoreError> {
        let location = ObjectPath::from(self.full_key(key));
        let result = match self.backend.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(backend_err(e)),
        };

        let mut stream = result.into_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.try_next().await.map_err(backend_err)? {
            dst.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        dst.flush().await?;
        debug!(key, bytes = written, "downloaded object");
        Ok(written)
    }
}
