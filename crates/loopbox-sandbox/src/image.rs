//! memfd-backed image staging and loop-device binding.
//!
//! A mount attempt stages the filesystem image in an anonymous memory-backed
//! file, then binds that file to a loop device node so the kernel sees a
//! block device. Both handles are `OwnedFd`s: dropping a [`LoopBinding`]
//! detaches the backing file and closes everything, so teardown rides on
//! ordinary scope exit.
//!
//! ## The busy race
//!
//! `LOOP_SET_FD` fails with `EBUSY` when a previous run crashed with its
//! backing file still attached, or another process transiently holds the
//! node. Recovery is one explicit round: detach whatever is attached, wait
//! about a millisecond, attach again. A second failure is fatal.

use std::ffi::CString;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use rustix::io::Errno;

use loopbox_sys::{last_errno, loopdev, memfd};

use crate::error::MountError;
use crate::segment::ImageSegment;

const BUSY_RETRY_DELAY: Duration = Duration::from_millis(1);

/// A staged, process-private filesystem image.
#[derive(Debug)]
pub struct Image {
    memfd: OwnedFd,
    size: u64,
}

impl Image {
    /// Allocate the backing store and declare its total size.
    pub fn create(size: u64) -> Result<Self, MountError> {
        let memfd = memfd::memfd_create(c"loopbox-image").map_err(MountError::Image)?;
        // SAFETY: memfd is a valid fd; size was clamped by the caller.
        if unsafe { libc::ftruncate(memfd.as_raw_fd(), size as libc::off_t) } != 0 {
            return Err(MountError::Image(last_errno()));
        }
        Ok(Self { memfd, size })
    }

    /// Scatter the segment bytes into the image at their offsets.
    ///
    /// Short and failed writes are tolerated: a partially-staged image still
    /// exercises the filesystem driver, which is all a reproducer needs.
    /// Each such write is surfaced as a warning.
    pub fn populate(&self, segments: &[ImageSegment<'_>]) {
        for seg in segments {
            let len = seg.data.len().min(seg.size as usize);
            // SAFETY: the buffer is valid for len bytes and memfd is open.
            let ret = unsafe {
                libc::pwrite(
                    self.memfd.as_raw_fd(),
                    seg.data.as_ptr().cast(),
                    len,
                    seg.offset as libc::off_t,
                )
            };
            if ret < 0 {
                tracing::warn!(offset = seg.offset, errno = %last_errno(), "segment write failed");
            } else if (ret as usize) < len {
                tracing::warn!(
                    offset = seg.offset,
                    expected = len,
                    written = ret,
                    "short segment write"
                );
            }
        }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
        self.memfd.as_fd()
    }
}

/// A live association between an [`Image`] and a loop device node.
///
/// Dropping the binding detaches the backing file and closes both handles;
/// a mounted filesystem keeps its own reference inside the kernel, so the
/// detach is safe on the success path too.
#[derive(Debug)]
pub struct LoopBinding {
    loopfd: OwnedFd,
    image: Image,
    path: PathBuf,
}

impl LoopBinding {
    /// Open `path` and attach the image as its backing file.
    ///
    /// On failure both the device handle and the image handle are closed
    /// before returning.
    pub fn bind(image: Image, path: &Path) -> Result<Self, MountError> {
        let loopfd = open_rdwr(path).map_err(|errno| MountError::LoopOpen {
            path: path.to_path_buf(),
            errno,
        })?;

        attach_with_recovery(
            || loopdev::attach_backing(loopfd.as_fd(), image.as_fd()),
            || {
                loopdev::detach_backing(loopfd.as_fd()).ok();
            },
        )
        .map_err(|err| err.into_mount_error(path))?;

        Ok(Self {
            loopfd,
            image,
            path: path.to_path_buf(),
        })
    }

    /// The device node this image is attached to, usable as a mount source.
    #[inline]
    pub fn device_path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }
}

impl Drop for LoopBinding {
    fn drop(&mut self) {
        if let Err(errno) = loopdev::detach_backing(self.loopfd.as_fd()) {
            tracing::warn!(path = %self.path.display(), %errno, "loop detach failed");
        }
    }
}

enum AttachError {
    /// First attach failed with something other than `EBUSY`.
    Fatal(Errno),
    /// The retried attach failed too.
    StillBusy(Errno),
}

impl AttachError {
    fn into_mount_error(self, path: &Path) -> MountError {
        match self {
            Self::Fatal(errno) => MountError::Attach {
                path: path.to_path_buf(),
                errno,
            },
            Self::StillBusy(errno) => MountError::DeviceBusy {
                path: path.to_path_buf(),
                errno,
            },
        }
    }
}

/// Attach with exactly one detach-and-retry round on `EBUSY`.
fn attach_with_recovery<A, D>(mut attach: A, detach: D) -> Result<(), AttachError>
where
    A: FnMut() -> Result<(), Errno>,
    D: FnOnce(),
{
    match attach() {
        Ok(()) => Ok(()),
        Err(Errno::BUSY) => {
            detach();
            thread::sleep(BUSY_RETRY_DELAY);
            attach().map_err(AttachError::StillBusy)
        }
        Err(errno) => Err(AttachError::Fatal(errno)),
    }
}

fn open_rdwr(path: &Path) -> Result<OwnedFd, Errno> {
    let path_c = CString::new(path.as_os_str().as_bytes()).map_err(|_| Errno::INVAL)?;
    // SAFETY: path_c is a valid NUL-terminated string.
    let fd = unsafe { libc::open(path_c.as_ptr(), libc::O_RDWR | libc::O_CLOEXEC) };
    if fd < 0 {
        Err(last_errno())
    } else {
        // SAFETY: on success the fd is fresh and owned.
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }
}
