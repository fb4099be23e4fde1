//! Fork/wait plumbing around a sandboxed worker.
//!
//! The PID namespace must be unshared *before* the fork for the child to
//! land in it, so worker creation is: unshare PID (best-effort), fork,
//! child enters the sandbox and runs the work function, parent blocks in
//! `waitpid` for exactly that child and propagates its exit status. The
//! parent does nothing else: no cancellation, no timeout; a worker stuck
//! in a hung mount stays stuck.

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use rustix::io::Errno;

use crate::error::SandboxError;
use crate::isolation::{self, namespaces, SandboxConfig};

/// Fork a sandboxed worker, run `work` in it, return its exit status.
///
/// `work` receives the worker id and returns the child's exit code. Inside
/// the child the sandbox is entered first; entry failure exits with status
/// 1 without running `work`. The network namespace is unshared after entry,
/// best-effort, like in the parent's PID unshare.
pub fn run_worker<F>(config: &SandboxConfig, worker_id: u32, work: F) -> Result<i32, SandboxError>
where
    F: FnOnce(u32) -> i32,
{
    if let Err(errno) = namespaces::unshare_pid() {
        tracing::warn!(%errno, "pid namespace unavailable, child shares ours");
    }

    // SAFETY: the child only touches its own process state and _exits;
    // it never returns into the caller's stack.
    match unsafe { fork() }.map_err(|e| SandboxError::Fork(nix_errno(e)))? {
        ForkResult::Child => {
            let code = child_main(config, worker_id, work);
            // SAFETY: _exit is always safe; it does not unwind.
            unsafe { libc::_exit(code) }
        }
        ForkResult::Parent { child } => wait_for_worker(child),
    }
}

fn child_main<F>(config: &SandboxConfig, worker_id: u32, work: F) -> i32
where
    F: FnOnce(u32) -> i32,
{
    match isolation::enter(config) {
        Ok(report) => {
            if !report.is_clean() {
                tracing::warn!(failed_steps = report.failures().len(), "degraded sandbox");
            }
        }
        Err(err) => {
            tracing::error!(%err, "sandbox entry failed");
            return 1;
        }
    }
    if let Err(errno) = namespaces::unshare_net() {
        tracing::warn!(%errno, "net namespace unavailable");
    }
    work(worker_id)
}

/// Reap descendants until the identified child exits, then translate its
/// status. `__WALL` matches children regardless of clone flags.
fn wait_for_worker(child: Pid) -> Result<i32, SandboxError> {
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::__WALL)) {
            Ok(WaitStatus::Exited(pid, code)) if pid == child => return Ok(code),
            Ok(WaitStatus::Signaled(pid, signal, _)) if pid == child => {
                return Ok(128 + signal as i32)
            }
            Ok(_) => continue,
            Err(err) => return Err(SandboxError::Wait(nix_errno(err))),
        }
    }
}

#[inline]
fn nix_errno(err: nix::errno::Errno) -> Errno {
    Errno::from_raw_os_error(err as i32)
}
