//! Daemon metadata decoding and `struct stat` hydration.
//!
//! The daemon's `/stat` responses carry synthesized POSIX attributes; this
//! module turns them into the exact structs the host process handed us,
//! fabricating the fields only the kernel would normally know: inode from
//! the path hash, link counts, block math, wall-clock timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

use libc::c_int;
use serde::Deserialize;

use crate::client::{self, IpcError};
use crate::config;
use crate::paths;

/// Subset of the daemon's wire entry the shim consumes. Unknown keys are
/// ignored; missing keys fall back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct RemoteMeta {
    #[serde(rename = "Path", default)]
    pub path: String,
    #[serde(rename = "Size", default)]
    pub size: i64,
    #[serde(rename = "Mode", default)]
    pub mode: u32,
    #[serde(rename = "UID", default)]
    pub uid: Option<u32>,
    #[serde(rename = "GID", default)]
    pub gid: Option<u32>,
    #[serde(rename = "IsDir", default)]
    pub is_dir: bool,
}

/// Issue `/stat` for an absolute local path and decode the entry.
pub fn fetch_meta(abs_path: &str) -> Result<RemoteMeta, IpcError> {
    let body = client::get_json("/stat", abs_path)?;
    serde_json::from_slice(&body).map_err(|_| IpcError::Malformed)
}

/// Hydrate missing type and permission bits. The daemon normally sends a
/// complete mode; responses from older builds may carry only one half.
pub fn derive_mode(meta: &RemoteMeta) -> u32 {
    let mut mode = meta.mode;
    let type_bits = if meta.is_dir {
        libc::S_IFDIR
    } else {
        libc::S_IFREG
    } as u32;
    if mode & (libc::S_IFMT as u32) == 0 {
        mode |= type_bits;
    }
    if mode & 0o777 == 0 {
        mode |= if meta.is_dir { 0o550 } else { 0o440 };
    }
    mode
}

pub fn is_dir(meta: &RemoteMeta) -> bool {
    meta.is_dir || derive_mode(meta) & (libc::S_IFMT as u32) == libc::S_IFDIR as u32
}

fn now() -> (i64, i64) {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, i64::from(d.subsec_nanos())),
        Err(_) => (0, 0),
    }
}

fn nlink(meta: &RemoteMeta) -> u64 {
    if meta.is_dir {
        2
    } else {
        1
    }
}

fn blocks(size: i64) -> i64 {
    (size + 511) / 512
}

/// # Safety
///
/// `st` must point to a writable `struct stat`.
pub unsafe fn hydrate_stat(abs_path: &str, meta: &RemoteMeta, st: *mut libc::stat) -> c_int {
    std::ptr::write_bytes(st, 0, 1);
    let st = &mut *st;
    st.st_mode = derive_mode(meta) as _;
    st.st_uid = meta.uid.unwrap_or_else(|| config::get().uid);
    st.st_gid = meta.gid.unwrap_or_else(|| config::get().gid);
    st.st_nlink = nlink(meta) as _;
    st.st_size = meta.size as _;
    st.st_blksize = 4096;
    st.st_blocks = blocks(meta.size) as _;
    st.st_dev = 0;
    st.st_ino = paths::hash_path(abs_path) as _;
    let (sec, nsec) = now();
    st.st_atime = sec as _;
    st.st_atime_nsec = nsec as _;
    st.st_mtime = sec as _;
    st.st_mtime_nsec = nsec as _;
    st.st_ctime = sec as _;
    st.st_ctime_nsec = nsec as _;
    0
}

/// # Safety
///
/// `st` must point to a writable `struct stat64`.
#[cfg(target_os = "linux")]
pub unsafe fn hydrate_stat64(abs_path: &str, meta: &RemoteMeta, st: *mut libc::stat64) -> c_int {
    std::ptr::write_bytes(st, 0, 1);
    let st = &mut *st;
    st.st_mode = derive_mode(meta) as _;
    st.st_uid = meta.uid.unwrap_or_else(|| config::get().uid);
    st.st_gid = meta.gid.unwrap_or_else(|| config::get().gid);
    st.st_nlink = nlink(meta) as _;
    st.st_size = meta.size as _;
    st.st_blksize = 4096;
    st.st_blocks = blocks(meta.size) as _;
    st.st_dev = 0;
    st.st_ino = paths::hash_path(abs_path) as _;
    let (sec, nsec) = now();
    st.st_atime = sec as _;
    st.st_atime_nsec = nsec as _;
    st.st_mtime = sec as _;
    st.st_mtime_nsec = nsec as _;
    st.st_ctime = sec as _;
    st.st_ctime_nsec = nsec as _;
    0
}

/// # Safety
///
/// `stx` must point to a writable `struct statx`.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub unsafe fn hydrate_statx(abs_path: &str, meta: &RemoteMeta, stx: *mut libc::statx) -> c_int {
    if stx.is_null() {
        crate::set_errno(libc::EFAULT);
        return -1;
    }
    std::ptr::write_bytes(stx, 0, 1);
    let stx = &mut *stx;
    stx.stx_mask = libc::STATX_BASIC_STATS;
    stx.stx_mode = derive_mode(meta) as u16;
    stx.stx_uid = meta.uid.unwrap_or_else(|| config::get().uid);
    stx.stx_gid = meta.gid.unwrap_or_else(|| config::get().gid);
    stx.stx_nlink = nlink(meta) as u32;
    stx.stx_size = meta.size as u64;
    stx.stx_blocks = blocks(meta.size) as u64;
    stx.stx_blksize = 4096;
    stx.stx_ino = paths::hash_path(abs_path);
    let (sec, nsec) = now();
    for ts in [&mut stx.stx_atime, &mut stx.stx_mtime, &mut stx.stx_ctime] {
        ts.tv_sec = sec;
        ts.tv_nsec = nsec as u32;
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_daemon_entry_ignoring_extra_keys() {
        let json = r#"{
            "Path": "docs/report.txt",
            "Size": 42,
            "ETag": "\"abc\"",
            "LastModified": "2026-01-02T03:04:05Z",
            "IsDir": false,
            "Mode": 33056,
            "UID": 1000,
            "GID": 100,
            "User": "alice",
            "Group": "users"
        }"#;
        let meta: RemoteMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.path, "docs/report.txt");
        assert_eq!(meta.size, 42);
        assert_eq!(meta.mode, 0o100440);
        assert_eq!(meta.uid, Some(1000));
        assert!(!meta.is_dir);
    }

    #[test]
    fn missing_fields_default() {
        let meta: RemoteMeta = serde_json::from_str(r#"{"IsDir": true}"#).unwrap();
        assert!(meta.is_dir);
        assert_eq!(meta.size, 0);
        assert_eq!(meta.mode, 0);
        assert_eq!(meta.uid, None);
    }

    #[test]
    fn derive_mode_fills_missing_halves() {
        let dir = RemoteMeta {
            is_dir: true,
            ..Default::default()
        };
        assert_eq!(derive_mode(&dir), libc::S_IFDIR as u32 | 0o550);

        let file = RemoteMeta::default();
        assert_eq!(derive_mode(&file), libc::S_IFREG as u32 | 0o440);

        // Permission bits present, type bits missing.
        let perms_only = RemoteMeta {
            mode: 0o640,
            ..Default::default()
        };
        assert_eq!(derive_mode(&perms_only), libc::S_IFREG as u32 | 0o640);

        // Complete modes pass through untouched.
        let complete = RemoteMeta {
            mode: libc::S_IFREG as u32 | 0o444,
            ..Default::default()
        };
        assert_eq!(derive_mode(&complete), libc::S_IFREG as u32 | 0o444);
    }

    #[test]
    fn hydrated_stat_fabricates_posix_view() {
        let meta = RemoteMeta {
            path: "docs/report.txt".to_string(),
            size: 1025,
            mode: 0,
            uid: Some(42),
            gid: Some(43),
            is_dir: false,
        };
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        let rc = unsafe { hydrate_stat("/remote/docs/report.txt", &meta, &mut st) };
        assert_eq!(rc, 0);
        assert_eq!(st.st_size, 1025);
        assert_eq!(st.st_blocks, 3);
        assert_eq!(st.st_blksize, 4096);
        assert_eq!(st.st_nlink, 1);
        assert_eq!(st.st_uid, 42);
        assert_eq!(st.st_gid, 43);
        assert_eq!(
            st.st_ino,
            paths::hash_path("/remote/docs/report.txt") as libc::ino_t
        );
        assert_eq!(st.st_mode as u32 & libc::S_IFMT as u32, libc::S_IFREG as u32);
        assert!(st.st_mtime > 0);
    }

    #[test]
    fn directories_get_two_links() {
        let meta = RemoteMeta {
            is_dir: true,
            ..Default::default()
        };
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        unsafe { hydrate_stat("/remote/docs", &meta, &mut st) };
        assert_eq!(st.st_nlink, 2);
        assert_eq!(st.st_mode as u32 & libc::S_IFMT as u32, libc::S_IFDIR as u32);
    }
}
