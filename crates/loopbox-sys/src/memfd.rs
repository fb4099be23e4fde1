//! Anonymous memory-backed file creation.
//!
//! `memfd_create` gives the harness a process-private backing store for the
//! synthetic filesystem image without touching any real filesystem. The fd
//! behaves like a regular file (`ftruncate`, `pwrite`) and disappears when
//! the last handle is closed.

use std::ffi::CStr;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use rustix::io::Errno;

use crate::last_errno;

/// Create an anonymous memory-backed file.
///
/// The name only shows up in `/proc/self/fd` and has no uniqueness
/// requirement.
pub fn memfd_create(name: &CStr) -> Result<OwnedFd, Errno> {
    // SAFETY: name is a valid NUL-terminated string; flags are zero.
    let fd = unsafe { libc::syscall(libc::SYS_memfd_create, name.as_ptr(), 0 as libc::c_uint) };
    if fd < 0 {
        Err(last_errno())
    } else {
        // SAFETY: on success the syscall returns a fresh, owned descriptor.
        Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
    }
}
