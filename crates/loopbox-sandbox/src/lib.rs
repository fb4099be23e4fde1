//! loopbox-sandbox: loop-backed image mounting inside an isolated worker.
//!
//! This crate is the reusable core of a fuzzing-harness reproducer. It
//! assembles a synthetic filesystem image from caller-supplied byte
//! segments, exposes the image through a loop block device, mounts it with
//! per-filesystem option adjustments, and tears the binding down on every
//! exit path. Workers run the sequence inside a restricted sandbox
//! (unshared namespaces, tightened rlimits, reduced capabilities).
//!
//! - **segment** - Bounds-clamping of caller-supplied image segments
//! - **image** - memfd-backed image staging and loop-device binding
//! - **options** - Per-filesystem mount option normalization
//! - **mount** - The single-pass mount orchestrator
//! - **isolation** - Sandbox entry (namespaces, rlimits, capabilities)
//! - **worker** - Fork/wait plumbing around a sandboxed worker
//!
//! ## Quick Start
//!
//! ```ignore
//! use loopbox_sandbox::{mount_image, ImageSegment, MountRequest, SandboxConfig};
//!
//! let status = loopbox_sandbox::run_worker(&SandboxConfig::default(), 0, |worker| {
//!     let request = MountRequest {
//!         fstype: "ext4",
//!         target: Path::new("./file1"),
//!         size: 0x10_0000,
//!         segments: Some(segments),
//!         flags: 0,
//!         options: "nobarrier,errors=remount-ro",
//!     };
//!     match mount_image(request, worker) {
//!         Ok(_dir) => 0,
//!         Err(err) => err.errno().raw_os_error(),
//!     }
//! })?;
//! ```
//!
//! ## Requirements
//!
//! - Linux 5.6+ (time namespaces)
//! - `/dev/loopN` nodes and privileges to attach and mount them

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod error;
pub mod image;
pub mod isolation;
pub mod mount;
pub mod options;
pub mod segment;
pub mod worker;

pub use error::{MountError, SandboxError};
pub use image::{Image, LoopBinding};
pub use isolation::{
    enter, FailurePolicy, SandboxConfig, SandboxLimits, SetupReport, SetupStep,
};
pub use mount::{loop_device_path, mount_image, MountRequest};
pub use options::normalize_options;
pub use segment::{clamp_segments, ImageSegment, MAX_IMAGE_SIZE, MAX_SEGMENTS};
pub use worker::run_worker;
