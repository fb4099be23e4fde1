//! Low-level Linux syscall wrappers for loop-device mount reproducers.
//!
//! This crate provides thin wrappers around the Linux-specific calls the
//! mount harness needs and that rustix or libc do not cover as typed APIs.
//! For standard syscalls, use rustix.
//!
//! ## Modules
//!
//! - **loopdev** - Loop-device control ioctls (`LOOP_SET_FD` / `LOOP_CLR_FD`)
//! - **memfd** - Anonymous memory-backed file creation
//! - **caps** - `capget`/`capset` with the v3 capability ABI
//! - **check** - Runtime system capability detection
//!
//! ## Loop devices
//!
//! A loop device exposes a regular file as a block device. The attach ioctl
//! fails with `EBUSY` when another backing file is already bound; callers are
//! expected to detach and retry, which is the one concurrency-shaped piece of
//! the whole harness.
//!
//! # Safety
//!
//! This crate contains raw syscall wrappers. Casts between integer types
//! are unavoidable when interfacing with the kernel ABI.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod caps;
pub mod check;
pub mod loopdev;
pub mod memfd;

pub use check::{check, CheckError, SystemInfo};

#[inline]
pub fn last_errno() -> rustix::io::Errno {
    // SAFETY: __errno_location always returns valid thread-local pointer.
    rustix::io::Errno::from_raw_os_error(unsafe { *libc::__errno_location() })
}
