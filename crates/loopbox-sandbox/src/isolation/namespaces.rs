//! Namespace unsharing for mount workers.
//!
//! Each worker gets private mount, IPC, UTS, time, and System-V semaphore
//! namespaces so nothing a hostile image does to the mount table or IPC
//! objects leaks out. After unsharing the mount namespace the root mount
//! tree is made recursively private; without that, mount events would still
//! propagate to the parent namespace on systems with shared root mounts.
//!
//! PID and network namespaces are not handled here: PID unsharing must
//! happen in the parent before the worker is forked (see
//! [`crate::worker`]), and the network namespace is unshared by the worker
//! itself after entry.

use nix::mount::{mount, MsFlags};
use nix::sched::{unshare, CloneFlags};
use rustix::io::Errno;

// From <linux/sched.h>; unshare-only flag that nix's CloneFlags does not
// carry.
const CLONE_NEWTIME: libc::c_int = 0x80;

pub fn unshare_mount() -> Result<(), Errno> {
    unshare(CloneFlags::CLONE_NEWNS).map_err(nix_errno)
}

pub fn unshare_ipc() -> Result<(), Errno> {
    unshare(CloneFlags::CLONE_NEWIPC).map_err(nix_errno)
}

pub fn unshare_uts() -> Result<(), Errno> {
    unshare(CloneFlags::CLONE_NEWUTS).map_err(nix_errno)
}

pub fn unshare_time() -> Result<(), Errno> {
    unshare(CloneFlags::from_bits_retain(CLONE_NEWTIME)).map_err(nix_errno)
}

pub fn unshare_sysv_sem() -> Result<(), Errno> {
    unshare(CloneFlags::CLONE_SYSVSEM).map_err(nix_errno)
}

pub fn unshare_pid() -> Result<(), Errno> {
    unshare(CloneFlags::CLONE_NEWPID).map_err(nix_errno)
}

pub fn unshare_net() -> Result<(), Errno> {
    unshare(CloneFlags::CLONE_NEWNET).map_err(nix_errno)
}

/// Make the root mount tree recursively private.
pub fn make_mount_tree_private() -> Result<(), Errno> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(nix_errno)
}

/// Best-effort mount of the fusectl control filesystem.
///
/// Gives the worker visibility into fuse connections when the image under
/// test reaches fuse; harmless to fail where fuse is absent.
pub fn mount_fusectl() -> Result<(), Errno> {
    mount(
        None::<&str>,
        "/sys/fs/fuse/connections",
        Some("fusectl"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(nix_errno)
}

#[inline]
fn nix_errno(err: nix::errno::Errno) -> Errno {
    Errno::from_raw_os_error(err as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_conversion_preserves_code() {
        assert_eq!(nix_errno(nix::errno::Errno::EBUSY), Errno::BUSY);
        assert_eq!(nix_errno(nix::errno::Errno::EPERM), Errno::PERM);
    }

    #[test]
    fn time_flag_is_not_a_known_clone_flag() {
        // The local constant exists only because nix has no CLONE_NEWTIME;
        // if it ever gains one, this starts failing and the constant goes.
        assert_eq!(CloneFlags::all().bits() & CLONE_NEWTIME, 0);
    }
}
