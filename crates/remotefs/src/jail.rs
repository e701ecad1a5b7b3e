//! Local-root containment and path sanitization.
//!
//! All canonicalization here is lexical: the sanitizer never touches the
//! disk, so it cannot follow symlinks out of the jail, cannot race against
//! concurrent renames, and never needs the network. The cost is that paths
//! are judged purely by their byte content, which is exactly the contract
//! the rest of the system builds on.

use std::path::PathBuf;

use crate::error::FsError;

/// Lexically canonicalize a path into an absolute, `/`-rooted form.
///
/// Empty and `.` segments are dropped, `..` pops one level and never ascends
/// past the root. Relative inputs are treated as `/`-rooted.
pub fn lexical_clean(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            seg => stack.push(seg),
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

/// Enforces that every handled path stays under the configured local root
/// and translates between local paths and relative store keys.
#[derive(Debug, Clone)]
pub struct PathJail {
    /// Canonical root, no trailing slash. Empty means no jail: any absolute
    /// path is accepted and its leading `/` stripped.
    root: String,
}

impl PathJail {
    pub fn new(root: &str) -> Self {
        let trimmed = root.trim();
        let root = if trimmed.is_empty() {
            String::new()
        } else {
            let cleaned = lexical_clean(trimmed);
            // A root of "/" jails nothing; treat it as unset.
            if cleaned == "/" {
                String::new()
            } else {
                cleaned
            }
        };
        Self { root }
    }

    /// The canonical root, or `""` when no root is configured.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The root as presented to users (`"/"` when unset).
    pub fn display_root(&self) -> &str {
        if self.root.is_empty() {
            "/"
        } else {
            &self.root
        }
    }

    /// Normalize `local` and strip the root, yielding the relative key
    /// (`""` for the root itself).
    ///
    /// The separator check is mandatory: `<root>-mirror/x` shares a string
    /// prefix with `<root>` but is outside the jail.
    pub fn sanitize(&self, local: &str) -> Result<String, FsError> {
        let local = local.trim();
        if local.is_empty() {
            return Err(FsError::EmptyPath);
        }
        let target = lexical_clean(local);
        if self.root.is_empty() {
            return Ok(target.trim_start_matches('/').to_string());
        }
        if target == self.root {
            return Ok(String::new());
        }
        match target.strip_prefix(&format!("{}/", self.root)) {
            Some(rest) => Ok(rest.to_string()),
            None => Err(FsError::OutsideRoot {
                path: target,
                root: self.root.clone(),
            }),
        }
    }

    /// Stitch a sanitized relative key back onto the root so errors can
    /// surface the path the caller originally used.
    pub fn join_local(&self, rel: &str) -> PathBuf {
        if self.root.is_empty() {
            if rel.is_empty() {
                PathBuf::from("/")
            } else {
                PathBuf::from(format!("/{rel}"))
            }
        } else if rel.is_empty() {
            PathBuf::from(&self.root)
        } else {
            PathBuf::from(format!("{}/{}", self.root, rel))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_clean_collapses_segments() {
        assert_eq!(lexical_clean("/"), "/");
        assert_eq!(lexical_clean("//a///b/"), "/a/b");
        assert_eq!(lexical_clean("/a/./b"), "/a/b");
        assert_eq!(lexical_clean("/a/b/../c"), "/a/c");
        assert_eq!(lexical_clean("/../../x"), "/x");
        assert_eq!(lexical_clean("relative/path"), "/relative/path");
    }

    #[test]
    fn sanitize_enforces_local_root() {
        let jail = PathJail::new("/var/data/remote");

        assert_eq!(jail.sanitize("/var/data/remote").unwrap(), "");
        assert_eq!(
            jail.sanitize("/var/data/remote/reports/today.txt").unwrap(),
            "reports/today.txt"
        );
        assert!(matches!(
            jail.sanitize("/var/data/remote/../other/file"),
            Err(FsError::OutsideRoot { .. })
        ));
        // Shares a string prefix with the root but is a sibling.
        assert!(matches!(
            jail.sanitize("/var/data/remote-mirror/file"),
            Err(FsError::OutsideRoot { .. })
        ));
        assert!(matches!(
            jail.sanitize("/var/data"),
            Err(FsError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn sanitize_rejects_empty_input() {
        let jail = PathJail::new("/remote");
        assert!(matches!(jail.sanitize(""), Err(FsError::EmptyPath)));
        assert!(matches!(jail.sanitize("   "), Err(FsError::EmptyPath)));
    }

    #[test]
    fn sanitize_without_root_strips_leading_slash() {
        let jail = PathJail::new("");
        assert_eq!(jail.sanitize("/alpha/beta").unwrap(), "alpha/beta");
        assert_eq!(jail.sanitize("/").unwrap(), "");
    }

    #[test]
    fn dotdot_inside_jail_is_resolved_before_the_check() {
        let jail = PathJail::new("/remote");
        assert_eq!(jail.sanitize("/remote/a/../b").unwrap(), "b");
        assert_eq!(jail.sanitize("/remote/./x").unwrap(), "x");
    }

    #[test]
    fn roundtrip_join_local() {
        let jail = PathJail::new("/data");
        for input in ["/data", "/data/docs", "/data/docs/report.txt"] {
            let rel = jail.sanitize(input).unwrap();
            assert_eq!(jail.join_local(&rel), PathBuf::from(input));
        }

        let no_root = PathJail::new("");
        assert_eq!(no_root.join_local(""), PathBuf::from("/"));
        assert_eq!(no_root.join_local("a/b"), PathBuf::from("/a/b"));
    }

    #[test]
    fn root_display_forms() {
        assert_eq!(PathJail::new("").display_root(), "/");
        assert_eq!(PathJail::new("/").display_root(), "/");
        assert_eq!(PathJail::new("/remote/").display_root(), "/remote");
    }
}
