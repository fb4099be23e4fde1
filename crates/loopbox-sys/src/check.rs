//! System capability checking.
//!
//! Verifies at runtime that the kernel supports what the harness needs
//! before any worker is spawned. The check is performed once and cached in a
//! static `OnceLock`.
//!
//! ## Required Features
//!
//! | Feature | Minimum | Check Method |
//! |---------|---------|--------------|
//! | Kernel | 5.6 | `uname` syscall (time namespaces) |
//! | `memfd_create` | present | probe syscall |
//! | Loop devices | present | `/dev/loop-control` node |

use std::path::Path;
use std::sync::OnceLock;

use rustix::io::Errno;
use rustix::system::uname;
use thiserror::Error;

use crate::memfd;

/// Information about the system's mount-harness capabilities.
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub kernel_version: (u32, u32, u32),
    pub memfd: bool,
    pub loop_control: bool,
}

/// Errors that can occur during system capability checking.
#[derive(Debug, Clone, Error)]
pub enum CheckError {
    #[error("kernel version {}.{}.{} is too old, need at least {}.{}.{}", .found.0, .found.1, .found.2, .required.0, .required.1, .required.2)]
    KernelTooOld {
        required: (u32, u32, u32),
        found: (u32, u32, u32),
    },

    #[error("memfd_create is not available: {0}")]
    MemfdNotAvailable(Errno),

    #[error("/dev/loop-control is missing (loop module not loaded?)")]
    LoopControlMissing,

    #[error("failed to read kernel version")]
    KernelVersionReadFailed,
}

// Time namespaces (CLONE_NEWTIME) appeared in 5.6; everything else the
// harness uses is older.
const MIN_KERNEL_VERSION: (u32, u32, u32) = (5, 6, 0);

static SYSTEM_INFO: OnceLock<Result<SystemInfo, CheckError>> = OnceLock::new();

/// Check system capabilities and cache the result.
pub fn check() -> Result<&'static SystemInfo, &'static CheckError> {
    SYSTEM_INFO.get_or_init(check_impl).as_ref()
}

fn check_impl() -> Result<SystemInfo, CheckError> {
    let kernel_version = kernel_version()?;
    if kernel_version < MIN_KERNEL_VERSION {
        return Err(CheckError::KernelTooOld {
            required: MIN_KERNEL_VERSION,
            found: kernel_version,
        });
    }

    memfd::memfd_create(c"loopbox-probe").map_err(CheckError::MemfdNotAvailable)?;

    let loop_control = Path::new("/dev/loop-control").exists();
    if !loop_control {
        return Err(CheckError::LoopControlMissing);
    }

    Ok(SystemInfo {
        kernel_version,
        memfd: true,
        loop_control,
    })
}

fn kernel_version() -> Result<(u32, u32, u32), CheckError> {
    let uts = uname();
    let release = uts
        .release()
        .to_str()
        .map_err(|_| CheckError::KernelVersionReadFailed)?;
    parse_release(release)
}

fn parse_release(release: &str) -> Result<(u32, u32, u32), CheckError> {
    let mut parts = release.split('.');
    let major: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or(CheckError::KernelVersionReadFailed)?;
    let minor: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or(CheckError::KernelVersionReadFailed)?;
    // Patch can carry a distro suffix like "0-generic"; missing means 0.
    let patch: u32 = parts
        .next()
        .and_then(|p| p.split('-').next())
        .and_then(|p| p.parse().ok())
        .unwrap_or(0);
    Ok((major, minor, patch))
}
