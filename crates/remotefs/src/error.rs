//! Error taxonomy for the filesystem facade.

use std::path::PathBuf;

use remotefs_object_store::StoreError;

/// Errors returned by the facade and its cache.
///
/// `NotFound` always carries the rendered local path the caller asked about,
/// so the message matches what POSIX tooling prints for a missing file. It
/// is preserved verbatim through every layer; other failures are opaque.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("{}: No such file or directory", .0.display())]
    NotFound(PathBuf),

    #[error("empty path")]
    EmptyPath,

    #[error("path {path} outside of {root}")]
    OutsideRoot { path: String, root: String },

    #[error("cannot read directory {}", .0.display())]
    IsADirectory(PathBuf),

    #[error("cache capacity {max} bytes exceeded by {needed}")]
    CapacityExceeded { max: u64, needed: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Whether the error denotes a missing path, at either layer.
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound(_) => true,
            FsError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }
}
