//! Resource limits for sandboxed mount workers.
//!
//! Hard ceilings applied once at sandbox entry, `rlim_cur == rlim_max` so
//! the worker cannot raise them back.
//!
//! ## Limits Applied
//!
//! | Limit | Ceiling |
//! |-------|---------|
//! | `RLIMIT_AS` | 200 MiB |
//! | `RLIMIT_MEMLOCK` | 32 MiB |
//! | `RLIMIT_FSIZE` | 136 MiB (one max-size image plus slack) |
//! | `RLIMIT_STACK` | 1 MiB |
//! | `RLIMIT_CORE` | 0 (no dumps) |
//! | `RLIMIT_NOFILE` | 256 |
//!
//! A single failed `setrlimit` does not stop the remaining limits from
//! being applied; the first error is reported to the caller afterwards.

use rustix::io::Errno;

use loopbox_sys::last_errno;

/// Fixed resource ceilings for one sandboxed worker.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    pub address_space: u64,
    pub locked_memory: u64,
    pub file_size: u64,
    pub stack: u64,
    pub core: u64,
    pub open_files: u64,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            address_space: 200 << 20,
            locked_memory: 32 << 20,
            file_size: 136 << 20,
            stack: 1 << 20,
            core: 0,
            open_files: 256,
        }
    }
}

/// Apply every limit, continuing past individual failures.
///
/// Returns the first error observed so the caller's policy can decide what
/// to do with it.
pub fn apply(limits: &SandboxLimits) -> Result<(), Errno> {
    let pairs = [
        (libc::RLIMIT_AS, limits.address_space),
        (libc::RLIMIT_MEMLOCK, limits.locked_memory),
        (libc::RLIMIT_FSIZE, limits.file_size),
        (libc::RLIMIT_STACK, limits.stack),
        (libc::RLIMIT_CORE, limits.core),
        (libc::RLIMIT_NOFILE, limits.open_files),
    ];

    let mut first_err = None;
    for (resource, limit) in pairs {
        if let Err(errno) = set_rlimit(resource, limit) {
            tracing::warn!(resource = resource as i32, limit, %errno, "setrlimit failed");
            first_err.get_or_insert(errno);
        }
    }

    match first_err {
        Some(errno) => Err(errno),
        None => Ok(()),
    }
}

#[inline]
fn set_rlimit(resource: libc::__rlimit_resource_t, limit: u64) -> Result<(), Errno> {
    let rlim = libc::rlimit {
        rlim_cur: limit,
        rlim_max: limit,
    };
    // SAFETY: rlim is valid, resource is a valid constant.
    if unsafe { libc::setrlimit(resource, &rlim) } != 0 {
        Err(last_errno())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ceilings() {
        let limits = SandboxLimits::default();
        assert_eq!(limits.address_space, 200 << 20);
        assert_eq!(limits.core, 0);
        assert!(limits.file_size > crate::segment::MAX_IMAGE_SIZE);
    }

    #[test]
    fn core_limit_applies_unprivileged() {
        // Lowering RLIMIT_CORE needs no privilege and is harmless to the
        // test process, so set_rlimit can be exercised for real.
        set_rlimit(libc::RLIMIT_CORE, 0).unwrap();

        let mut rlim = libc::rlimit {
            rlim_cur: 1,
            rlim_max: 1,
        };
        // SAFETY: rlim is a valid out-pointer.
        assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_CORE, &mut rlim) }, 0);
        assert_eq!(rlim.rlim_cur, 0);
        assert_eq!(rlim.rlim_max, 0);
    }
}
