//! Object-store access layer for remotefs.
//!
//! The remote side of the filesystem is a flat keyspace: there are no
//! directory entities, only object keys that happen to share `/`-separated
//! prefixes. This crate defines the three operations the filesystem facade
//! needs (`head`, `list`, `download`) and a [`BucketStore`] adapter that
//! reconstructs one level of hierarchy per listing from delimiter queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWrite;

mod bucket;

pub use bucket::{BucketStore, S3Config};

/// Metadata for a single logical file or directory in the remote store.
///
/// Directories never exist as objects; they are synthesized from common
/// prefixes, carry `size == 0`, and have no meaningful etag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Relative, slash-separated path. Never starts with `/`; empty for the
    /// virtual root.
    pub path: String,
    /// Object size in bytes; 0 for directories.
    pub size: u64,
    /// Backend etag, opaque to callers.
    pub etag: String,
    /// Last modification instant, when the backend reports one.
    pub last_modified: Option<DateTime<Utc>>,
    /// Whether this entry is a synthesized directory.
    pub is_dir: bool,
}

impl FileMeta {
    /// A synthesized directory entry for `path`.
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            etag: String::new(),
            last_modified: None,
            is_dir: true,
        }
    }
}

/// Errors surfaced by the store.
///
/// `NotFound` is deliberately a distinct variant: the filesystem facade
/// changes behavior on it (directory fallback, error rendering) while every
/// other failure is passed through opaquely.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}: not found")]
    NotFound(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("object store: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Whether the error represents a missing remote object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// The storage provider abstraction consumed by the filesystem facade.
///
/// Keys are normalized, slash-separated paths relative to the configured
/// root prefix; the implementation is responsible for translating them to
/// fully qualified backend keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Return metadata for a single object.
    async fn head(&self, key: &str) -> Result<FileMeta, StoreError>;

    /// Return metadata for the direct children of `key` (depth 1).
    ///
    /// The key may be `""`, representing the virtual root. Common prefixes
    /// become directory entries; objects nested deeper than one level are
    /// skipped.
    async fn list(&self, key: &str) -> Result<Vec<FileMeta>, StoreError>;

    /// Stream the full content of an object into `dst` at monotonically
    /// increasing offsets and return the number of bytes written.
    async fn download(
        &self,
        key: &str,
        dst: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StoreError>;
}
