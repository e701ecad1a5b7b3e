//! Materialized directory listings and the process-global handle registry.
//!
//! `opendir` on a jailed path builds a [`ShimDir`]: the `.` and `..`
//! entries followed by every `/ls` child, each pre-rendered as both a
//! 32-bit and a 64-bit dirent sized exactly to its name. The opaque `DIR*`
//! returned to the host process is the address of the boxed `ShimDir`; a
//! mutex-guarded registry records live addresses so the other directory
//! hooks can tell our handles from real ones. Cursors are not internally
//! synchronized - callers must not iterate one handle from two threads,
//! matching POSIX.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::mem::{align_of, offset_of};
use std::ptr::NonNull;
use std::sync::Mutex;

use crate::client::IpcError;
use crate::meta::RemoteMeta;
use crate::paths;

/// Exact-size allocation holding one pre-built dirent.
struct DirentBuf {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl DirentBuf {
    fn alloc(size: usize, align: usize) -> Self {
        let layout = Layout::from_size_align(size, align).expect("dirent layout");
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            handle_alloc_error(layout);
        };
        Self { ptr, layout }
    }

    fn new32(name: &str, dtype: u8, ino: u64, off: i64) -> Self {
        let name_len = name.len();
        let size = offset_of!(libc::dirent, d_name) + name_len + 1;
        let buf = Self::alloc(size, align_of::<libc::dirent>());
        unsafe {
            let d = buf.ptr.as_ptr() as *mut libc::dirent;
            std::ptr::addr_of_mut!((*d).d_ino).write(ino as _);
            #[cfg(target_os = "linux")]
            std::ptr::addr_of_mut!((*d).d_off).write(off as _);
            #[cfg(target_os = "macos")]
            std::ptr::addr_of_mut!((*d).d_seekoff).write(off as _);
            std::ptr::addr_of_mut!((*d).d_reclen).write(size as u16);
            std::ptr::addr_of_mut!((*d).d_type).write(dtype);
            let dst = std::ptr::addr_of_mut!((*d).d_name) as *mut u8;
            std::ptr::copy_nonoverlapping(name.as_ptr(), dst, name_len);
            // Zero-fill from alloc_zeroed already supplies the terminator.
        }
        buf
    }

    #[cfg(target_os = "linux")]
    fn new64(name: &str, dtype: u8, ino: u64, off: i64) -> Self {
        let name_len = name.len();
        let size = offset_of!(libc::dirent64, d_name) + name_len + 1;
        let buf = Self::alloc(size, align_of::<libc::dirent64>());
        unsafe {
            let d = buf.ptr.as_ptr() as *mut libc::dirent64;
            std::ptr::addr_of_mut!((*d).d_ino).write(ino);
            std::ptr::addr_of_mut!((*d).d_off).write(off);
            std::ptr::addr_of_mut!((*d).d_reclen).write(size as u16);
            std::ptr::addr_of_mut!((*d).d_type).write(dtype);
            let dst = std::ptr::addr_of_mut!((*d).d_name) as *mut u8;
            std::ptr::copy_nonoverlapping(name.as_ptr(), dst, name_len);
        }
        buf
    }
}

impl Drop for DirentBuf {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

struct DirEntry {
    #[allow(dead_code)]
    name: String,
    d32: DirentBuf,
    #[cfg(target_os = "linux")]
    d64: DirentBuf,
}

/// One materialized directory listing with an iteration cursor.
pub struct ShimDir {
    pub abs: String,
    pub rel: String,
    entries: Vec<DirEntry>,
    cursor: usize,
}

/// Trim the parent prefix so a listing entry exposes only its own name.
fn relative_name(dir_rel: &str, entry_rel: &str) -> String {
    let rest = if dir_rel.is_empty() {
        entry_rel
    } else {
        match entry_rel.strip_prefix(dir_rel) {
            Some(rest) => rest.strip_prefix('/').unwrap_or(rest),
            None => entry_rel,
        }
    };
    match rest.find('/') {
        Some(idx) => rest[..idx].to_string(),
        None => rest.to_string(),
    }
}

impl ShimDir {
    /// Build a listing from already-extracted `(name, is_dir)` children.
    /// `.` and `..` always come first.
    pub fn from_entries(abs: &str, rel: &str, children: &[(String, bool)]) -> Self {
        let mut dir = Self {
            abs: abs.to_string(),
            rel: rel.to_string(),
            entries: Vec::with_capacity(children.len() + 2),
            cursor: 0,
        };
        dir.push_entry(".", true);
        dir.push_entry("..", true);
        for (name, is_dir) in children {
            if name.is_empty() {
                continue;
            }
            dir.push_entry(name, *is_dir);
        }
        dir
    }

    /// Build a listing from a raw `/ls` JSON body.
    pub fn from_json(abs: &str, rel: &str, json: &[u8]) -> Result<Self, IpcError> {
        let items: Vec<RemoteMeta> =
            serde_json::from_slice(json).map_err(|_| IpcError::Malformed)?;
        let children: Vec<(String, bool)> = items
            .iter()
            .map(|m| (relative_name(rel, &m.path), m.is_dir))
            .collect();
        Ok(Self::from_entries(abs, rel, &children))
    }

    fn push_entry(&mut self, name: &str, is_dir: bool) {
        let full_path = if name == "." || name == ".." {
            self.abs.clone()
        } else if self.abs == "/" {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.abs)
        };
        let ino = paths::hash_path(&full_path);
        let dtype = if is_dir { libc::DT_DIR } else { libc::DT_REG };
        let off = self.entries.len() as i64;
        self.entries.push(DirEntry {
            name: name.to_string(),
            d32: DirentBuf::new32(name, dtype, ino, off),
            #[cfg(target_os = "linux")]
            d64: DirentBuf::new64(name, dtype, ino, off),
        });
    }

    /// Next 32-bit entry, or null at end-of-directory.
    pub fn next32(&mut self) -> *mut libc::dirent {
        match self.entries.get(self.cursor) {
            Some(entry) => {
                self.cursor += 1;
                entry.d32.ptr.as_ptr() as *mut libc::dirent
            }
            None => std::ptr::null_mut(),
        }
    }

    /// Next 64-bit entry, or null at end-of-directory.
    #[cfg(target_os = "linux")]
    pub fn next64(&mut self) -> *mut libc::dirent64 {
        match self.entries.get(self.cursor) {
            Some(entry) => {
                self.cursor += 1;
                entry.d64.ptr.as_ptr() as *mut libc::dirent64
            }
            None => std::ptr::null_mut(),
        }
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn tell(&self) -> libc::c_long {
        self.cursor as libc::c_long
    }

    /// Reposition the cursor; out-of-range positions are ignored.
    pub fn seek(&mut self, loc: libc::c_long) {
        if loc >= 0 && (loc as usize) < self.entries.len() {
            self.cursor = loc as usize;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

static REGISTRY: Mutex<Vec<usize>> = Mutex::new(Vec::new());

/// Leak the listing and hand its address back as the opaque `DIR*`.
pub fn register(dir: Box<ShimDir>) -> *mut libc::DIR {
    let ptr = Box::into_raw(dir);
    REGISTRY.lock().unwrap().push(ptr as usize);
    ptr.cast()
}

/// Resolve a `DIR*` to a live shim handle, if it is one of ours.
pub fn lookup(handle: *mut libc::DIR) -> Option<*mut ShimDir> {
    if handle.is_null() {
        return None;
    }
    let addr = handle as usize;
    let registry = REGISTRY.lock().unwrap();
    registry.contains(&addr).then_some(addr as *mut ShimDir)
}

/// Remove a handle from the registry and reclaim its allocation.
pub fn unregister(handle: *mut libc::DIR) -> Option<Box<ShimDir>> {
    let addr = handle as usize;
    let mut registry = REGISTRY.lock().unwrap();
    let pos = registry.iter().position(|&a| a == addr)?;
    registry.swap_remove(pos);
    drop(registry);
    Some(unsafe { Box::from_raw(addr as *mut ShimDir) })
}
