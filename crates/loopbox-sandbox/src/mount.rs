//! The single-pass mount orchestrator.
//!
//! One call stages the image, binds it to the worker's loop device, mounts
//! it, and opens the mounted directory. The loop binding lives in a scope
//! that ends before the function returns, so teardown happens on every
//! exit path: success, mount failure, or a failed directory open alike.
//!
//! There are no retries here beyond the one busy-recovery round embedded in
//! [`LoopBinding::bind`]; a hung mount blocks the worker indefinitely,
//! which the surrounding harness accepts.

use std::ffi::CString;
use std::fs;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use rustix::io::Errno;

use loopbox_sys::last_errno;

use crate::error::MountError;
use crate::image::{Image, LoopBinding};
use crate::options::normalize_options;
use crate::segment::{clamp_segments, ImageSegment};

/// One mount attempt, as handed over by the test driver.
///
/// With `segments` present the mount is loop-backed: the image is staged
/// and bound to the worker's loop device, which becomes the mount source.
/// Without segments the filesystem is mounted sourceless (proc-style).
#[derive(Debug)]
pub struct MountRequest<'a> {
    pub fstype: &'a str,
    pub target: &'a Path,
    /// Requested total image size; clamped and grown over the segments.
    pub size: u64,
    pub segments: Option<Vec<ImageSegment<'a>>>,
    pub flags: libc::c_ulong,
    pub options: &'a str,
}

/// The loop device node assigned to a worker.
///
/// A pure function of the worker id, so concurrently-running workers never
/// contend for the same node.
pub fn loop_device_path(worker_id: u32) -> PathBuf {
    PathBuf::from(format!("/dev/loop{worker_id}"))
}

/// Stage, bind, and mount one image; return the opened target directory.
///
/// The target directory is created best-effort before mounting. On any
/// outcome the loop binding (when one was established) is released before
/// this function returns; the earliest error wins.
pub fn mount_image(
    mut request: MountRequest<'_>,
    worker_id: u32,
) -> Result<OwnedFd, MountError> {
    let binding = match request.segments.as_mut() {
        Some(segments) => {
            let size = clamp_segments(request.size, segments);
            let image = Image::create(size)?;
            image.populate(segments);
            Some(LoopBinding::bind(image, &loop_device_path(worker_id))?)
        }
        None => None,
    };

    prepare_target(request.target);

    let (flags, options) = normalize_options(request.fstype, request.flags, request.options);
    let source = binding.as_ref().map(LoopBinding::device_path);

    // The binding outlives the mount call and is dropped (detached) when
    // this function returns, whichever branch is taken.
    do_mount(source, request.target, request.fstype, flags, &options)?;
    open_directory(request.target).map_err(MountError::OpenTarget)
}

/// Create the mount target if absent. Failure is deliberately ignored:
/// mounting over a pre-existing or uncreatable target produces the more
/// interesting error from `mount(2)` itself.
fn prepare_target(target: &Path) {
    if let Err(err) = fs::create_dir(target) {
        if err.kind() != io::ErrorKind::AlreadyExists {
            tracing::debug!(path = %target.display(), %err, "mkdir failed, mounting anyway");
        }
    }
}

fn do_mount(
    source: Option<&Path>,
    target: &Path,
    fstype: &str,
    flags: libc::c_ulong,
    options: &str,
) -> Result<(), MountError> {
    let source_c = source
        .map(path_to_cstring)
        .transpose()
        .map_err(MountError::Mount)?;
    let target_c = path_to_cstring(target).map_err(MountError::Mount)?;
    let fstype_c = CString::new(fstype).map_err(|_| MountError::Mount(Errno::INVAL))?;
    let options_c = CString::new(options).map_err(|_| MountError::Mount(Errno::INVAL))?;

    let source_ptr = match &source_c {
        Some(c) => c.as_ptr(),
        None => std::ptr::null(),
    };

    // SAFETY: all pointers reference live CStrings for the duration of the
    // call; flags and data match the mount(2) contract.
    let ret = unsafe {
        libc::mount(
            source_ptr,
            target_c.as_ptr(),
            fstype_c.as_ptr(),
            flags,
            options_c.as_ptr().cast(),
        )
    };
    if ret != 0 {
        Err(MountError::Mount(last_errno()))
    } else {
        Ok(())
    }
}

fn open_directory(target: &Path) -> Result<OwnedFd, Errno> {
    let target_c = path_to_cstring(target)?;
    // SAFETY: target_c is a valid NUL-terminated string.
    let fd = unsafe {
        libc::open(
            target_c.as_ptr(),
            libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC,
        )
    };
    if fd < 0 {
        Err(last_errno())
    } else {
        // SAFETY: on success the fd is fresh and owned.
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }
}

#[inline]
fn path_to_cstring(path: &Path) -> Result<CString, Errno> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| Errno::INVAL)
}
