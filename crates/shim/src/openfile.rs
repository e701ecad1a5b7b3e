//! Read-only open of a jailed path.
//!
//! The object is streamed into an anonymous scratch file under the shim
//! cache directory, reopened read-only, and unlinked immediately, so the
//! descriptor handed back behaves like any local fd (read, seek, mmap) and
//! closing it reclaims the disk space.

use std::os::unix::io::IntoRawFd;

use libc::c_int;

use crate::{client, config, meta, set_errno};

/// Flags that imply write intent; all are refused before any I/O happens.
pub fn write_intent(flags: c_int) -> bool {
    let mask = libc::O_WRONLY | libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC | libc::O_APPEND;
    if flags & mask != 0 {
        return true;
    }
    // O_TMPFILE shares bits with O_DIRECTORY; require the full value.
    #[cfg(target_os = "linux")]
    if flags & libc::O_TMPFILE == libc::O_TMPFILE {
        return true;
    }
    false
}

/// Open `abs` (already confirmed inside the jail) read-only. Returns a raw
/// fd, or -1 with errno set.
pub fn remote_open(abs: &str, flags: c_int) -> c_int {
    if write_intent(flags) {
        set_errno(libc::EROFS);
        return -1;
    }

    let meta = match meta::fetch_meta(abs) {
        Ok(meta) => meta,
        Err(e) => {
            set_errno(e.errno());
            return -1;
        }
    };
    if meta::is_dir(&meta) {
        set_errno(libc::EISDIR);
        return -1;
    }

    let mut scratch = match tempfile::NamedTempFile::new_in(&config::get().cache_dir) {
        Ok(scratch) => scratch,
        Err(e) => {
            set_errno(e.raw_os_error().unwrap_or(libc::EIO));
            return -1;
        }
    };
    if let Err(e) = client::get_to_file("/cat", abs, scratch.as_file_mut()) {
        set_errno(e.errno());
        return -1;
    }

    let file = match std::fs::File::open(scratch.path()) {
        Ok(file) => file,
        Err(e) => {
            set_errno(e.raw_os_error().unwrap_or(libc::EIO));
            return -1;
        }
    };
    // Dropping the scratch handle unlinks the path; the reopened descriptor
    // keeps the content alive until the host process closes it.
    drop(scratch);
    file.into_raw_fd()
}
