//! Sandbox entry for mount workers.
//!
//! Establishes isolation once per worker process, before any mount attempt:
//!
//! - **limits** - Fixed resource ceilings (rlimits)
//! - **namespaces** - Mount/IPC/UTS/time/SysV-semaphore unsharing
//! - **caps** - Dropping `CAP_SYS_PTRACE` and `CAP_SYS_NICE`
//! - **tunables** - System-V IPC sysctl writes via an abstract sink
//!
//! Historically every step here except the capability drop failed silently.
//! That asymmetry is now an explicit, configurable policy: under
//! [`FailurePolicy::Warn`] a failed step is logged and recorded in the
//! [`SetupReport`]; under [`FailurePolicy::Abort`] it ends sandbox entry.
//! The capability drop is fatal under either policy.

pub mod caps;
pub mod limits;
pub mod namespaces;
pub mod tunables;

use rustix::io::Errno;

use loopbox_sys::last_errno;

use crate::error::SandboxError;

pub use limits::SandboxLimits;
pub use tunables::{ProcfsTunables, TunableSink};

/// What to do when a best-effort setup step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure, record it in the report, keep going.
    #[default]
    Warn,
    /// Treat the first failed step as fatal to sandbox entry.
    Abort,
}

/// One step of sandbox entry, named for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    FusectlMount,
    DeathSignal,
    NewSession,
    ResourceLimits,
    MountNamespace,
    PrivateMountTree,
    IpcNamespace,
    UtsNamespace,
    TimeNamespace,
    SysvSemNamespace,
    Tunables,
}

/// Configuration for sandbox entry.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfig {
    pub limits: SandboxLimits,
    pub policy: FailurePolicy,
    /// Skip the capability drop, e.g. when the harness itself needs ptrace.
    pub keep_caps: bool,
}

impl SandboxConfig {
    pub fn abort_on_failure(mut self) -> Self {
        self.policy = FailurePolicy::Abort;
        self
    }

    pub fn keep_caps(mut self) -> Self {
        self.keep_caps = true;
        self
    }
}

/// Outcome of the best-effort steps of sandbox entry.
#[derive(Debug, Default)]
pub struct SetupReport {
    failures: Vec<(SetupStep, Errno)>,
}

impl SetupReport {
    fn record(&mut self, step: SetupStep, errno: Errno) {
        self.failures.push((step, errno));
    }

    /// True when every setup step succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[(SetupStep, Errno)] {
        &self.failures
    }
}

/// Enter the sandbox in the calling process.
///
/// Mounts fusectl, then applies the death signal, session detach, resource
/// limits, namespace unsharing, tunable writes, and capability drop in that
/// order. Call once per worker process, before the first mount attempt;
/// limits are not renegotiable afterwards.
pub fn enter(config: &SandboxConfig) -> Result<SetupReport, SandboxError> {
    enter_with_sink(config, &ProcfsTunables)
}

/// [`enter`] with an explicit tunable sink, for hosts that redirect sysctl
/// writes.
pub fn enter_with_sink(
    config: &SandboxConfig,
    sink: &dyn TunableSink,
) -> Result<SetupReport, SandboxError> {
    let mut report = SetupReport::default();
    let policy = config.policy;

    // fusectl goes first, while the mount namespace is still shared: the
    // mount is meant to outlive individual workers.
    step(
        &mut report,
        policy,
        SetupStep::FusectlMount,
        namespaces::mount_fusectl(),
    )?;

    step(&mut report, policy, SetupStep::DeathSignal, die_with_parent())?;
    step(&mut report, policy, SetupStep::NewSession, new_session())?;
    step(
        &mut report,
        policy,
        SetupStep::ResourceLimits,
        limits::apply(&config.limits),
    )?;

    step(
        &mut report,
        policy,
        SetupStep::MountNamespace,
        namespaces::unshare_mount(),
    )?;
    step(
        &mut report,
        policy,
        SetupStep::PrivateMountTree,
        namespaces::make_mount_tree_private(),
    )?;
    step(
        &mut report,
        policy,
        SetupStep::IpcNamespace,
        namespaces::unshare_ipc(),
    )?;
    step(
        &mut report,
        policy,
        SetupStep::UtsNamespace,
        namespaces::unshare_uts(),
    )?;
    step(
        &mut report,
        policy,
        SetupStep::TimeNamespace,
        namespaces::unshare_time(),
    )?;
    step(
        &mut report,
        policy,
        SetupStep::SysvSemNamespace,
        namespaces::unshare_sysv_sem(),
    )?;

    step(
        &mut report,
        policy,
        SetupStep::Tunables,
        tunables::apply_defaults(sink),
    )?;

    if !config.keep_caps {
        caps::drop_trace_and_nice().map_err(SandboxError::Capability)?;
    }

    Ok(report)
}

fn step(
    report: &mut SetupReport,
    policy: FailurePolicy,
    step: SetupStep,
    result: Result<(), Errno>,
) -> Result<(), SandboxError> {
    match result {
        Ok(()) => Ok(()),
        Err(errno) => match policy {
            FailurePolicy::Warn => {
                tracing::warn!(?step, %errno, "sandbox setup step failed");
                report.record(step, errno);
                Ok(())
            }
            FailurePolicy::Abort => Err(SandboxError::Setup { step, errno }),
        },
    }
}

/// Ask the kernel to SIGKILL this process when its parent dies.
fn die_with_parent() -> Result<(), Errno> {
    // SAFETY: prctl with valid constants and no pointers.
    if unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL, 0, 0, 0) } != 0 {
        Err(last_errno())
    } else {
        Ok(())
    }
}

/// Detach from the controlling terminal by starting a new session.
fn new_session() -> Result<(), Errno> {
    // SAFETY: setsid takes no arguments.
    if unsafe { libc::setsid() } < 0 {
        Err(last_errno())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_starts_clean() {
        let report = SetupReport::default();
        assert!(report.is_clean());
        assert!(report.failures().is_empty());
    }

    #[test]
    fn warn_policy_records_and_continues() {
        let mut report = SetupReport::default();
        let result = step(
            &mut report,
            FailurePolicy::Warn,
            SetupStep::NewSession,
            Err(Errno::PERM),
        );
        assert!(result.is_ok());
        assert_eq!(report.failures(), &[(SetupStep::NewSession, Errno::PERM)]);
    }

    #[test]
    fn abort_policy_stops_at_first_failure() {
        let mut report = SetupReport::default();
        let result = step(
            &mut report,
            FailurePolicy::Abort,
            SetupStep::MountNamespace,
            Err(Errno::PERM),
        );
        assert!(matches!(
            result,
            Err(SandboxError::Setup {
                step: SetupStep::MountNamespace,
                errno: Errno::PERM,
            })
        ));
    }
}
