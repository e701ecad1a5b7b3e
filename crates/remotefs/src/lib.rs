//! remotefs - a read-only view of an object store rooted at a local path.
//!
//! No kernel modules, mounts, or FUSE: the [`RemoteFs`] facade translates
//! local-style paths into object-store calls, caches downloaded content in a
//! bounded on-disk LRU, and can snapshot the whole remote namespace so
//! `stat` runs without network hops. Consumers are the IPC daemon, the CLI,
//! and (indirectly, over the daemon's socket) the interception shim.

pub mod cache;
pub mod error;
pub mod fs;
pub mod jail;

pub use cache::ContentCache;
pub use error::FsError;
pub use fs::{FsConfig, ReadHandle, RemoteFs};
pub use jail::PathJail;
