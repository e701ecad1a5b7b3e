//! POSIX attribute synthesis at the IPC boundary.
//!
//! The store knows nothing about ownership or permission bits, and the
//! facade deliberately keeps it that way. Fixed modes and the daemon's own
//! effective identity are stamped onto every response here, so `ls -la`
//! output stays stable across deep trees instead of leaking backend
//! idiosyncrasies.

use chrono::{DateTime, Utc};
use nix::unistd::{Gid, Group, Uid, User};
use serde::{Deserialize, Serialize};

use remotefs_object_store::FileMeta;

const MODE_DIR_BITS: u32 = 0o040000;
const MODE_REG_BITS: u32 = 0o100000;
const DIR_PERMS: u32 = 0o550;
const FILE_PERMS: u32 = 0o440;

/// Wire projection of [`FileMeta`]. Key names are fixed by the IPC contract
/// and consumed by the interception shim; do not rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosixEntry {
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "LastModified")]
    pub last_modified: DateTime<Utc>,
    #[serde(rename = "IsDir")]
    pub is_dir: bool,
    #[serde(rename = "Mode")]
    pub mode: u32,
    #[serde(rename = "UID")]
    pub uid: u32,
    #[serde(rename = "GID")]
    pub gid: u32,
    #[serde(rename = "User")]
    pub user: String,
    #[serde(rename = "Group")]
    pub group: String,
}

/// Effective identity of the daemon process, captured once at startup.
#[derive(Debug, Clone)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
    pub user: String,
    pub group: String,
}

impl Identity {
    /// Capture the effective uid/gid and resolve their names. Failed name
    /// lookups leave empty strings rather than failing the server.
    pub fn current() -> Self {
        let uid = Uid::effective();
        let gid = Gid::effective();
        let user = User::from_uid(uid)
            .ok()
            .flatten()
            .map(|u| u.name)
            .unwrap_or_default();
        let group = Group::from_gid(gid)
            .ok()
            .flatten()
            .map(|g| g.name)
            .unwrap_or_default();
        Self {
            uid: uid.as_raw(),
            gid: gid.as_raw(),
            user,
            group,
        }
    }
}

/// Synthesized mode for entries the backend cannot describe.
pub fn default_mode(is_dir: bool) -> u32 {
    if is_dir {
        MODE_DIR_BITS | DIR_PERMS
    } else {
        MODE_REG_BITS | FILE_PERMS
    }
}

/// Project store metadata into the wire shape, stamping identity, mode, and
/// a wall-clock timestamp when the store did not report one.
pub fn entry_from_meta(meta: &FileMeta, identity: &Identity) -> PosixEntry {
    PosixEntry {
        path: meta.path.clone(),
        size: meta.size,
        etag: meta.etag.clone(),
        last_modified: meta.last_modified.unwrap_or_else(Utc::now),
        is_dir: meta.is_dir,
        mode: default_mode(meta.is_dir),
        uid: identity.uid,
        gid: identity.gid,
        user: identity.user.clone(),
        group: identity.group.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            uid: 1000,
            gid: 100,
            user: "alice".to_string(),
            group: "users".to_string(),
        }
    }

    #[test]
    fn modes_carry_type_and_permission_bits() {
        assert_eq!(default_mode(true), 0o040550);
        assert_eq!(default_mode(false), 0o100440);
    }

    #[test]
    fn entry_synthesis_fills_identity_and_timestamp() {
        let meta = FileMeta {
            path: "docs/report.txt".to_string(),
            size: 42,
            etag: "\"abc\"".to_string(),
            last_modified: None,
            is_dir: false,
        };
        let entry = entry_from_meta(&meta, &identity());
        assert_eq!(entry.path, "docs/report.txt");
        assert_eq!(entry.size, 42);
        assert_eq!(entry.mode, 0o100440);
        assert_eq!(entry.uid, 1000);
        assert_eq!(entry.gid, 100);
        assert_eq!(entry.user, "alice");
        assert_eq!(entry.group, "users");
        // Missing store timestamp is replaced with the current wall clock.
        assert!(entry.last_modified > Utc::now() - chrono::Duration::minutes(1));
    }

    #[test]
    fn wire_keys_are_pascal_case() {
        let entry = entry_from_meta(&FileMeta::dir("docs"), &identity());
        let value = serde_json::to_value(&entry).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "Path",
            "Size",
            "ETag",
            "LastModified",
            "IsDir",
            "Mode",
            "UID",
            "GID",
            "User",
            "Group",
        ] {
            assert!(obj.contains_key(key), "missing wire key {key}");
        }
        assert_eq!(obj["IsDir"], serde_json::Value::Bool(true));
        assert_eq!(obj["Mode"], serde_json::json!(0o040550));
    }

    #[test]
    fn round_trips_through_json() {
        let entry = entry_from_meta(
            &FileMeta {
                path: "a.txt".to_string(),
                size: 7,
                etag: String::new(),
                last_modified: Some(Utc::now()),
                is_dir: false,
            },
            &identity(),
        );
        let json = serde_json::to_string(&entry).unwrap();
        let back: PosixEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.path, entry.path);
        assert_eq!(back.size, entry.size);
        assert_eq!(back.mode, entry.mode);
    }
}
