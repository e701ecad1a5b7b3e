//! Path canonicalization, jail membership, and inode fabrication.
//!
//! Canonicalization is lexical, mirroring the daemon's sanitizer: the shim
//! must never follow symlinks (that would leak the host filesystem) and
//! must not call the daemon just to normalize a path. Relative paths are
//! resolved against the CWD, or against the directory behind a `dirfd` for
//! the `*at` variants.

use libc::c_int;

/// Absolute + root-relative form of a jailed path.
#[derive(Debug, PartialEq, Eq)]
pub struct JailedPath {
    pub abs: String,
    pub rel: String,
}

/// Lexically canonicalize `path` into an absolute `/`-rooted form,
/// resolving relative input against the current working directory.
pub fn canonicalize(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    let joined;
    let absolute = if path.starts_with('/') {
        path
    } else {
        let cwd = std::env::current_dir().ok()?;
        joined = format!("{}/{}", cwd.display(), path);
        &joined
    };

    let mut stack: Vec<&str> = Vec::new();
    for segment in absolute.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            seg => stack.push(seg),
        }
    }
    Some(if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    })
}

/// Absolute path backing a directory file descriptor.
fn dirfd_path(dirfd: c_int) -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let link = std::fs::read_link(format!("/proc/self/fd/{dirfd}")).ok()?;
        canonicalize(link.to_str()?)
    }
    #[cfg(target_os = "macos")]
    {
        let mut buf = [0u8; libc::PATH_MAX as usize];
        let rc = unsafe { libc::fcntl(dirfd, libc::F_GETPATH, buf.as_mut_ptr()) };
        if rc != 0 {
            return None;
        }
        let end = buf.iter().position(|&b| b == 0)?;
        canonicalize(std::str::from_utf8(&buf[..end]).ok()?)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = dirfd;
        None
    }
}

/// Combine a `dirfd` and a path into an absolute canonical path, the way
/// the `*at` syscall family resolves its arguments.
pub fn resolve_at(dirfd: c_int, path: &str) -> Option<String> {
    if path.starts_with('/') || dirfd == libc::AT_FDCWD {
        return canonicalize(path);
    }
    let base = dirfd_path(dirfd)?;
    canonicalize(&format!("{base}/{path}"))
}

/// Check jail membership and split the path into absolute and relative
/// forms. The separator check is mandatory: `<root>-mirror` shares a string
/// prefix with `<root>` but lies outside the jail.
pub fn within_root(root: &str, path: &str) -> Option<JailedPath> {
    let abs = canonicalize(path)?;
    if root.is_empty() || root == "/" {
        let rel = abs.trim_start_matches('/').to_string();
        return Some(JailedPath { abs, rel });
    }
    if abs == root {
        return Some(JailedPath {
            abs,
            rel: String::new(),
        });
    }
    let rel = abs.strip_prefix(root)?.strip_prefix('/')?.to_string();
    Some(JailedPath { abs, rel })
}

/// FNV-1a 64-bit over the path bytes: a stable inode surrogate so tools
/// like `ls` see consistent numbers. Collisions are possible and accepted;
/// the path, never the inode, is identity.
pub fn hash_path(path: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in path.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
