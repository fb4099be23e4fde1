//! `capget`/`capset` with the v3 capability ABI.
//!
//! The libc crate has no safe surface for the capability syscalls, and the
//! v3 ABI works on pairs of 32-bit data structs (capabilities 0-31 in the
//! first element, 32-63 in the second). The harness only ever clears bits in
//! the low word, but both elements must round-trip through `capget` before
//! `capset` or the kernel rejects the call.

use rustix::io::Errno;

use crate::last_errno;

// From <linux/capability.h>.
pub const LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;
pub const CAP_SYS_PTRACE: u32 = 19;
pub const CAP_SYS_NICE: u32 = 23;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CapUserHeader {
    pub version: u32,
    pub pid: libc::c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CapUserData {
    pub effective: u32,
    pub permitted: u32,
    pub inheritable: u32,
}

impl CapUserHeader {
    /// Header addressing the calling process.
    pub fn current() -> Self {
        Self {
            version: LINUX_CAPABILITY_VERSION_3,
            // capget/capset require 0 (not the process id) to address the
            // calling thread; passing getpid() fails with EPERM from any
            // thread other than the main one.
            pid: 0,
        }
    }
}

/// Read the capability sets of the process named by `header`.
pub fn capget(header: &mut CapUserHeader, data: &mut [CapUserData; 2]) -> Result<(), Errno> {
    // SAFETY: header and data are valid, correctly-sized v3 ABI structs.
    let ret = unsafe { libc::syscall(libc::SYS_capget, header as *mut _, data.as_mut_ptr()) };
    if ret != 0 {
        Err(last_errno())
    } else {
        Ok(())
    }
}

/// Write the capability sets of the process named by `header`.
pub fn capset(header: &CapUserHeader, data: &[CapUserData; 2]) -> Result<(), Errno> {
    // SAFETY: header and data are valid, correctly-sized v3 ABI structs.
    let ret = unsafe { libc::syscall(libc::SYS_capset, header as *const _, data.as_ptr()) };
    if ret != 0 {
        Err(last_errno())
    } else {
        Ok(())
    }
}
