//! Error taxonomy for mount attempts and sandbox entry.
//!
//! Mount errors always carry the underlying OS error code; the caller of a
//! reproducer wants the errno the kernel produced, not a prose rendering.
//! Segment clamping is deliberately absent here: validation narrows the
//! request silently and never fails.

use std::path::PathBuf;

use rustix::io::Errno;
use thiserror::Error;

use crate::isolation::SetupStep;

/// Error from a single mount attempt.
#[derive(Debug, Error)]
pub enum MountError {
    /// Backing-store allocation or size declaration failed.
    #[error("backing image: {0}")]
    Image(Errno),

    #[error("open {path}: {errno}")]
    LoopOpen { path: PathBuf, errno: Errno },

    /// Attach failed with something other than a busy conflict.
    #[error("attach backing file to {path}: {errno}")]
    Attach { path: PathBuf, errno: Errno },

    /// Attach failed again after the one detach-and-retry round.
    #[error("{path} still busy after retry: {errno}")]
    DeviceBusy { path: PathBuf, errno: Errno },

    #[error("mount: {0}")]
    Mount(Errno),

    /// The mount itself succeeded; opening the mounted directory did not.
    #[error("open mount target: {0}")]
    OpenTarget(Errno),
}

impl MountError {
    /// The underlying OS error code.
    pub fn errno(&self) -> Errno {
        match self {
            Self::Image(errno) | Self::Mount(errno) | Self::OpenTarget(errno) => *errno,
            Self::LoopOpen { errno, .. }
            | Self::Attach { errno, .. }
            | Self::DeviceBusy { errno, .. } => *errno,
        }
    }
}

/// Error from sandbox entry or worker management.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// A setup step failed under [`FailurePolicy::Abort`](crate::FailurePolicy).
    #[error("sandbox setup step {step:?}: {errno}")]
    Setup { step: SetupStep, errno: Errno },

    /// Capability reduction failed. Always fatal, regardless of policy.
    #[error("capability drop: {0}")]
    Capability(Errno),

    #[error("fork: {0}")]
    Fork(Errno),

    #[error("wait: {0}")]
    Wait(Errno),
}
