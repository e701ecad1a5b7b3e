//! Shared CLI plumbing: store/facade construction from common flags.

pub mod op;
pub mod ops;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use remotefs::{FsConfig, FsError, RemoteFs};
use remotefs_object_store::{BucketStore, S3Config, StoreError};

const DEFAULT_CACHE_SIZE: u64 = 512 * 1024 * 1024;

/// Flags shared by the daemon and every CLI subcommand.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// S3 bucket name
    #[arg(long)]
    pub bucket: String,

    /// Key prefix acting as the virtual root inside the bucket
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// S3 region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Optional S3-compatible endpoint (MinIO, Ceph, ...)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// S3 access key
    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    pub access_key: Option<String>,

    /// S3 secret key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Local path under which the remote view is exposed
    #[arg(long, default_value = "/remote")]
    pub local_root: String,

    /// Directory for the on-disk content cache (defaults to the temp dir)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Content cache budget in bytes
    #[arg(long, default_value_t = DEFAULT_CACHE_SIZE)]
    pub cache_size: u64,

    /// Object store RPC timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("connect object store: {0}")]
    Store(#[from] StoreError),
    #[error("init filesystem: {0}")]
    Fs(#[from] FsError),
}

impl StoreArgs {
    /// Build the facade from the parsed flags.
    pub fn open(&self) -> Result<Arc<RemoteFs>, SetupError> {
        let store = BucketStore::open_s3(&S3Config {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
        })?;
        let fs = RemoteFs::new(
            Arc::new(store),
            FsConfig {
                local_root: self.local_root.clone(),
                cache_dir: self.cache_dir.clone(),
                cache_size: self.cache_size,
            },
        )?;
        Ok(Arc::new(fs))
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout)
    }
}
