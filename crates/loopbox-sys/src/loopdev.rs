//! Loop-device control ioctls.
//!
//! The libc crate exposes `ioctl` but not the loop request codes, so they are
//! defined here from `<linux/loop.h>`. Only the two calls the harness needs
//! are wrapped: attaching a backing file and detaching it again.
//!
//! `EBUSY` from the attach ioctl means another backing file is currently
//! bound to the device node. It is a distinguished, recoverable condition:
//! the caller detaches whatever is attached and retries.

use std::os::fd::{AsRawFd, BorrowedFd};

use rustix::io::Errno;

use crate::last_errno;

// From <linux/loop.h>.
const LOOP_SET_FD: libc::c_ulong = 0x4C00;
const LOOP_CLR_FD: libc::c_ulong = 0x4C01;

/// Attach `backing` as the backing file of the opened loop device.
pub fn attach_backing(loopfd: BorrowedFd<'_>, backing: BorrowedFd<'_>) -> Result<(), Errno> {
    // SAFETY: both fds are valid for the duration of the call.
    let ret = unsafe { libc::ioctl(loopfd.as_raw_fd(), LOOP_SET_FD, backing.as_raw_fd()) };
    if ret != 0 {
        Err(last_errno())
    } else {
        Ok(())
    }
}

/// Detach whatever backing file is currently bound to the loop device.
///
/// Fails with `ENXIO` when the device has no backing file; callers clearing
/// a device left over from a crashed run treat that as already-detached.
pub fn detach_backing(loopfd: BorrowedFd<'_>) -> Result<(), Errno> {
    // SAFETY: loopfd is a valid fd; LOOP_CLR_FD takes no argument.
    let ret = unsafe { libc::ioctl(loopfd.as_raw_fd(), LOOP_CLR_FD, 0) };
    if ret != 0 {
        Err(last_errno())
    } else {
        Ok(())
    }
}
