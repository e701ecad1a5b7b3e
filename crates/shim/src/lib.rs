//! remotefs interception shim.
//!
//! Loaded into unmodified processes via `LD_PRELOAD`, this library hijacks
//! the POSIX file entry points and, for paths under `REMOTEFS_ROOT`,
//! answers them from the remotefs daemon over its Unix socket. Everything
//! else is forwarded to the original libc symbols, resolved lazily through
//! `dlsym(RTLD_NEXT, ...)`.
//!
//! Rules of the house: initialization happens once, lazily, on the first
//! intercepted call; hooks never panic across the FFI boundary (the logic
//! below is panic-free by construction: no unwraps, no allocator-failure
//! paths we don't abort on); errors surface as `-1` plus `errno` exactly
//! like the syscalls they replace.

#![cfg(unix)]
#![allow(clippy::missing_safety_doc)]

use std::ffi::CStr;

use libc::{c_char, c_int, c_long};
#[cfg(all(target_os = "linux", target_env = "gnu"))]
use libc::c_uint;

pub mod client;
pub mod config;
pub mod dirs;
pub mod meta;
pub mod openfile;
pub mod paths;

pub(crate) fn set_errno(value: c_int) {
    #[cfg(target_os = "linux")]
    unsafe {
        *libc::__errno_location() = value;
    }
    #[cfg(target_os = "macos")]
    unsafe {
        *libc::__error() = value;
    }
}

fn cstr<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    // Non-UTF-8 paths cannot name remote objects; they fall through to the
    // real symbol.
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// Resolve the next occurrence of a symbol, once, and cache the address.
macro_rules! real {
    ($sym:ident: fn($($t:ty),* $(,)?) -> $ret:ty) => {{
        static REAL: once_cell::sync::OnceCell<usize> = once_cell::sync::OnceCell::new();
        let addr = *REAL.get_or_init(|| unsafe {
            libc::dlsym(
                libc::RTLD_NEXT,
                concat!(stringify!($sym), "\0").as_ptr() as *const libc::c_char,
            ) as usize
        });
        if addr == 0 {
            None
        } else {
            Some(unsafe {
                std::mem::transmute::<usize, unsafe extern "C" fn($($t),*) -> $ret>(addr)
            })
        }
    }};
}

fn jailed(path: *const c_char) -> Option<paths::JailedPath> {
    let cfg = config::get();
    cstr(path).and_then(|p| paths::within_root(&cfg.root, p))
}

fn jailed_at(dirfd: c_int, path: *const c_char) -> Option<paths::JailedPath> {
    let cfg = config::get();
    cstr(path)
        .and_then(|p| paths::resolve_at(dirfd, p))
        .and_then(|abs| paths::within_root(&cfg.root, &abs))
}

unsafe fn remote_stat(abs: &str, st: *mut libc::stat) -> c_int {
    match meta::fetch_meta(abs) {
        Ok(m) => meta::hydrate_stat(abs, &m, st),
        Err(e) => {
            set_errno(e.errno());
            -1
        }
    }
}

#[cfg(target_os = "linux")]
unsafe fn remote_stat64(abs: &str, st: *mut libc::stat64) -> c_int {
    match meta::fetch_meta(abs) {
        Ok(m) => meta::hydrate_stat64(abs, &m, st),
        Err(e) => {
            set_errno(e.errno());
            -1
        }
    }
}

// ---------------------------------------------------------------------------
// stat family
// ---------------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn stat(path: *const c_char, st: *mut libc::stat) -> c_int {
    if let Some(jp) = jailed(path) {
        return remote_stat(&jp.abs, st);
    }
    match real!(stat: fn(*const c_char, *mut libc::stat) -> c_int) {
        Some(f) => f(path, st),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

// The remote tree never exposes symlinks, so lstat behaves like stat for
// jailed paths.
#[no_mangle]
pub unsafe extern "C" fn lstat(path: *const c_char, st: *mut libc::stat) -> c_int {
    if let Some(jp) = jailed(path) {
        return remote_stat(&jp.abs, st);
    }
    match real!(lstat: fn(*const c_char, *mut libc::stat) -> c_int) {
        Some(f) => f(path, st),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn __xstat(ver: c_int, path: *const c_char, st: *mut libc::stat) -> c_int {
    if let Some(jp) = jailed(path) {
        return remote_stat(&jp.abs, st);
    }
    match real!(__xstat: fn(c_int, *const c_char, *mut libc::stat) -> c_int) {
        Some(f) => f(ver, path, st),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn __lxstat(ver: c_int, path: *const c_char, st: *mut libc::stat) -> c_int {
    if let Some(jp) = jailed(path) {
        return remote_stat(&jp.abs, st);
    }
    match real!(__lxstat: fn(c_int, *const c_char, *mut libc::stat) -> c_int) {
        Some(f) => f(ver, path, st),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn stat64(path: *const c_char, st: *mut libc::stat64) -> c_int {
    if let Some(jp) = jailed(path) {
        return remote_stat64(&jp.abs, st);
    }
    match real!(stat64: fn(*const c_char, *mut libc::stat64) -> c_int) {
        Some(f) => f(path, st),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn lstat64(path: *const c_char, st: *mut libc::stat64) -> c_int {
    if let Some(jp) = jailed(path) {
        return remote_stat64(&jp.abs, st);
    }
    match real!(lstat64: fn(*const c_char, *mut libc::stat64) -> c_int) {
        Some(f) => f(path, st),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __xstat64(ver: c_int, path: *const c_char, st: *mut libc::stat64) -> c_int {
    if let Some(jp) = jailed(path) {
        return remote_stat64(&jp.abs, st);
    }
    match real!(__xstat64: fn(c_int, *const c_char, *mut libc::stat64) -> c_int) {
        Some(f) => f(ver, path, st),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn __lxstat64(
    ver: c_int,
    path: *const c_char,
    st: *mut libc::stat64,
) -> c_int {
    if let Some(jp) = jailed(path) {
        return remote_stat64(&jp.abs, st);
    }
    match real!(__lxstat64: fn(c_int, *const c_char, *mut libc::stat64) -> c_int) {
        Some(f) => f(ver, path, st),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn fstatat(
    dirfd: c_int,
    path: *const c_char,
    st: *mut libc::stat,
    flags: c_int,
) -> c_int {
    if let Some(jp) = jailed_at(dirfd, path) {
        return remote_stat(&jp.abs, st);
    }
    match real!(fstatat: fn(c_int, *const c_char, *mut libc::stat, c_int) -> c_int) {
        Some(f) => f(dirfd, path, st, flags),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn __fxstatat(
    ver: c_int,
    dirfd: c_int,
    path: *const c_char,
    st: *mut libc::stat,
    flags: c_int,
) -> c_int {
    if let Some(jp) = jailed_at(dirfd, path) {
        return remote_stat(&jp.abs, st);
    }
    match real!(__fxstatat: fn(c_int, c_int, *const c_char, *mut libc::stat, c_int) -> c_int) {
        Some(f) => f(ver, dirfd, path, st, flags),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[no_mangle]
pub unsafe extern "C" fn statx(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mask: c_uint,
    stx: *mut libc::statx,
) -> c_int {
    if let Some(jp) = jailed_at(dirfd, path) {
        return match meta::fetch_meta(&jp.abs) {
            Ok(m) => meta::hydrate_statx(&jp.abs, &m, stx),
            Err(e) => {
                set_errno(e.errno());
                -1
            }
        };
    }
    match real!(statx: fn(c_int, *const c_char, c_int, c_uint, *mut libc::statx) -> c_int) {
        Some(f) => f(dirfd, path, flags, mask, stx),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

// ---------------------------------------------------------------------------
// open family
// ---------------------------------------------------------------------------
//
// open(2) is variadic in C; the mode argument is only read by the callee
// when O_CREAT / O_TMPFILE is present, so declaring it as a fixed third
// parameter is ABI-compatible on every supported platform.

#[no_mangle]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int {
    if let Some(jp) = jailed(path) {
        return openfile::remote_open(&jp.abs, flags);
    }
    match real!(open: fn(*const c_char, c_int, libc::mode_t) -> c_int) {
        Some(f) => f(path, flags, mode),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn open64(path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int {
    if let Some(jp) = jailed(path) {
        return openfile::remote_open(&jp.abs, flags);
    }
    match real!(open64: fn(*const c_char, c_int, libc::mode_t) -> c_int) {
        Some(f) => f(path, flags, mode),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn openat(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: libc::mode_t,
) -> c_int {
    if let Some(jp) = jailed_at(dirfd, path) {
        return openfile::remote_open(&jp.abs, flags);
    }
    match real!(openat: fn(c_int, *const c_char, c_int, libc::mode_t) -> c_int) {
        Some(f) => f(dirfd, path, flags, mode),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

// ---------------------------------------------------------------------------
// directory iteration
// ---------------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn opendir(path: *const c_char) -> *mut libc::DIR {
    let Some(jp) = jailed(path) else {
        return match real!(opendir: fn(*const c_char) -> *mut libc::DIR) {
            Some(f) => f(path),
            None => std::ptr::null_mut(),
        };
    };
    let body = match client::get_json("/ls", &jp.abs) {
        Ok(body) => body,
        Err(e) => {
            set_errno(e.errno());
            return std::ptr::null_mut();
        }
    };
    match dirs::ShimDir::from_json(&jp.abs, &jp.rel, &body) {
        Ok(dir) => dirs::register(Box::new(dir)),
        Err(e) => {
            set_errno(e.errno());
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn readdir(dirp: *mut libc::DIR) -> *mut libc::dirent {
    if let Some(dir) = dirs::lookup(dirp) {
        return (*dir).next32();
    }
    match real!(readdir: fn(*mut libc::DIR) -> *mut libc::dirent) {
        Some(f) => f(dirp),
        None => std::ptr::null_mut(),
    }
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn readdir64(dirp: *mut libc::DIR) -> *mut libc::dirent64 {
    if let Some(dir) = dirs::lookup(dirp) {
        return (*dir).next64();
    }
    match real!(readdir64: fn(*mut libc::DIR) -> *mut libc::dirent64) {
        Some(f) => f(dirp),
        None => std::ptr::null_mut(),
    }
}

unsafe fn copy_dirent32(src: *const libc::dirent, dst: *mut libc::dirent) {
    let name = CStr::from_ptr(std::ptr::addr_of!((*src).d_name) as *const c_char);
    let len = std::mem::offset_of!(libc::dirent, d_name) + name.to_bytes().len() + 1;
    std::ptr::copy_nonoverlapping(src as *const u8, dst as *mut u8, len);
}

#[no_mangle]
pub unsafe extern "C" fn readdir_r(
    dirp: *mut libc::DIR,
    entry: *mut libc::dirent,
    result: *mut *mut libc::dirent,
) -> c_int {
    if let Some(dir) = dirs::lookup(dirp) {
        let next = (*dir).next32();
        if next.is_null() {
            if !result.is_null() {
                *result = std::ptr::null_mut();
            }
            return 0;
        }
        copy_dirent32(next, entry);
        if !result.is_null() {
            *result = entry;
        }
        return 0;
    }
    match real!(readdir_r: fn(*mut libc::DIR, *mut libc::dirent, *mut *mut libc::dirent) -> c_int)
    {
        Some(f) => f(dirp, entry, result),
        None => libc::EBADF,
    }
}

#[cfg(target_os = "linux")]
unsafe fn copy_dirent64(src: *const libc::dirent64, dst: *mut libc::dirent64) {
    let name = CStr::from_ptr(std::ptr::addr_of!((*src).d_name) as *const c_char);
    let len = std::mem::offset_of!(libc::dirent64, d_name) + name.to_bytes().len() + 1;
    std::ptr::copy_nonoverlapping(src as *const u8, dst as *mut u8, len);
}

#[cfg(target_os = "linux")]
#[no_mangle]
pub unsafe extern "C" fn readdir64_r(
    dirp: *mut libc::DIR,
    entry: *mut libc::dirent64,
    result: *mut *mut libc::dirent64,
) -> c_int {
    if let Some(dir) = dirs::lookup(dirp) {
        let next = (*dir).next64();
        if next.is_null() {
            if !result.is_null() {
                *result = std::ptr::null_mut();
            }
            return 0;
        }
        copy_dirent64(next, entry);
        if !result.is_null() {
            *result = entry;
        }
        return 0;
    }
    match real!(readdir64_r: fn(*mut libc::DIR, *mut libc::dirent64, *mut *mut libc::dirent64) -> c_int)
    {
        Some(f) => f(dirp, entry, result),
        None => libc::EBADF,
    }
}

#[no_mangle]
pub unsafe extern "C" fn closedir(dirp: *mut libc::DIR) -> c_int {
    if let Some(dir) = dirs::unregister(dirp) {
        drop(dir);
        return 0;
    }
    match real!(closedir: fn(*mut libc::DIR) -> c_int) {
        Some(f) => f(dirp),
        None => -1,
    }
}

#[no_mangle]
pub unsafe extern "C" fn rewinddir(dirp: *mut libc::DIR) {
    if let Some(dir) = dirs::lookup(dirp) {
        (*dir).rewind();
        return;
    }
    if let Some(f) = real!(rewinddir: fn(*mut libc::DIR) -> ()) {
        f(dirp);
    }
}

#[no_mangle]
pub unsafe extern "C" fn telldir(dirp: *mut libc::DIR) -> c_long {
    if let Some(dir) = dirs::lookup(dirp) {
        return (*dir).tell();
    }
    match real!(telldir: fn(*mut libc::DIR) -> c_long) {
        Some(f) => f(dirp),
        None => -1,
    }
}

#[no_mangle]
pub unsafe extern "C" fn seekdir(dirp: *mut libc::DIR, loc: c_long) {
    if let Some(dir) = dirs::lookup(dirp) {
        (*dir).seek(loc);
        return;
    }
    if let Some(f) = real!(seekdir: fn(*mut libc::DIR, c_long) -> ()) {
        f(dirp, loc);
    }
}

// A synthetic directory has no backing descriptor to expose.
#[no_mangle]
pub unsafe extern "C" fn dirfd(dirp: *mut libc::DIR) -> c_int {
    if dirs::lookup(dirp).is_some() {
        set_errno(libc::ENOTSUP);
        return -1;
    }
    match real!(dirfd: fn(*mut libc::DIR) -> c_int) {
        Some(f) => f(dirp),
        None => -1,
    }
}

// ---------------------------------------------------------------------------
// access
// ---------------------------------------------------------------------------

unsafe fn remote_access(abs: &str, mode: c_int) -> c_int {
    if mode & libc::W_OK != 0 {
        set_errno(libc::EROFS);
        return -1;
    }
    match meta::fetch_meta(abs) {
        Ok(_) => 0,
        Err(e) => {
            set_errno(e.errno());
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn access(path: *const c_char, mode: c_int) -> c_int {
    if let Some(jp) = jailed(path) {
        return remote_access(&jp.abs, mode);
    }
    match real!(access: fn(*const c_char, c_int) -> c_int) {
        Some(f) => f(path, mode),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn faccessat(
    dirfd: c_int,
    path: *const c_char,
    mode: c_int,
    flags: c_int,
) -> c_int {
    if let Some(jp) = jailed_at(dirfd, path) {
        return remote_access(&jp.abs, mode);
    }
    match real!(faccessat: fn(c_int, *const c_char, c_int, c_int) -> c_int) {
        Some(f) => f(dirfd, path, mode, flags),
        None => {
            set_errno(libc::ENOSYS);
            -1
        }
    }
}
