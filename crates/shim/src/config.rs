//! Once-per-process shim configuration.
//!
//! Resolved lazily on the first intercepted call, from the same environment
//! contract the daemon documents. Initialization must never fail: a bad
//! root falls back to the default and a missing cache directory is created
//! on the spot, because the host process did not opt into error handling.

use std::path::PathBuf;

use once_cell::sync::Lazy;

use crate::paths;

pub const ENV_ROOT: &str = "REMOTEFS_ROOT";
pub const ENV_SOCKET: &str = "REMOTEFS_SOCKET";
pub const ENV_CACHE: &str = "REMOTEFS_SHIM_CACHE";

const DEFAULT_ROOT: &str = "/remote";
const DEFAULT_SOCKET: &str = "/tmp/remotefs.sock";

#[derive(Debug)]
pub struct ShimConfig {
    /// Canonical jail root, no trailing slash.
    pub root: String,
    /// Daemon Unix socket path.
    pub socket: PathBuf,
    /// Private scratch directory for downloaded objects.
    pub cache_dir: PathBuf,
    /// Effective identity of the host process, used when the daemon
    /// response omits ownership.
    pub uid: libc::uid_t,
    pub gid: libc::gid_t,
}

static CONFIG: Lazy<ShimConfig> = Lazy::new(ShimConfig::from_env);

/// The process-wide configuration, initialized exactly once across threads.
pub fn get() -> &'static ShimConfig {
    &CONFIG
}

fn env_or(name: &str, fallback: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => v,
        _ => fallback.to_string(),
    }
}

impl ShimConfig {
    fn from_env() -> Self {
        let root_raw = env_or(ENV_ROOT, DEFAULT_ROOT);
        let mut root =
            paths::canonicalize(&root_raw).unwrap_or_else(|| DEFAULT_ROOT.to_string());
        while root.len() > 1 && root.ends_with('/') {
            root.pop();
        }

        let socket = PathBuf::from(env_or(ENV_SOCKET, DEFAULT_SOCKET));

        let cache_dir = match std::env::var(ENV_CACHE) {
            Ok(v) if !v.is_empty() => PathBuf::from(v),
            _ => {
                let tmp = env_or("TMPDIR", "/tmp");
                PathBuf::from(tmp).join("remotefs-shim")
            }
        };
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = std::fs::DirBuilder::new();
            builder.recursive(true).mode(0o700);
            let _ = builder.create(&cache_dir);
        }

        let (uid, gid) = unsafe { (libc::geteuid(), libc::getegid()) };
        Self {
            root,
            socket,
            cache_dir,
            uid,
            gid,
        }
    }
}
