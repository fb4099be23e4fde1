//! Capability reduction for mount workers.
//!
//! The worker keeps enough privilege to attach loop devices and mount
//! filesystems, but `CAP_SYS_PTRACE` and `CAP_SYS_NICE` are removed from
//! the effective, permitted, and inheritable sets: a compromised worker
//! must not inspect its siblings or starve them of CPU.
//!
//! Unlike the rest of sandbox entry this is fatal on failure: a worker
//! that cannot verify its capability state is not allowed to run at all.

use rustix::io::Errno;

use loopbox_sys::caps::{capget, capset, CapUserData, CapUserHeader, CAP_SYS_NICE, CAP_SYS_PTRACE};

/// Drop `CAP_SYS_PTRACE` and `CAP_SYS_NICE` from the calling process.
pub fn drop_trace_and_nice() -> Result<(), Errno> {
    let mut header = CapUserHeader::current();
    let mut data = [CapUserData::default(); 2];
    capget(&mut header, &mut data)?;

    let dropped = (1 << CAP_SYS_PTRACE) | (1 << CAP_SYS_NICE);
    data[0].effective &= !dropped;
    data[0].permitted &= !dropped;
    data[0].inheritable &= !dropped;

    capset(&header, &data)
}
