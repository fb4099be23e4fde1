//! Loop-device binding and mount teardown tests.
//!
//! Everything here needs root and a free `/dev/loopN`, so the tests are
//! `#[ignore]`d by default; run with `cargo test -- --ignored` on a
//! privileged host. A high device number keeps us away from nodes the
//! system may be using.

use std::os::fd::AsFd;

use loopbox_sandbox::{
    loop_device_path, mount_image, Image, ImageSegment, LoopBinding, MountError, MountRequest,
};

const WORKER: u32 = 7;

fn require_device() {
    let path = loop_device_path(WORKER);
    assert!(
        path.exists(),
        "{} missing; load the loop module with enough minors",
        path.display()
    );
}

fn staged_image() -> Image {
    let image = Image::create(0x10_0000).unwrap();
    image.populate(&[ImageSegment {
        data: b"not a filesystem",
        size: 16,
        offset: 0x400,
    }]);
    image
}

#[test]
#[ignore]
fn bind_and_drop_leaves_device_detached() {
    require_device();
    let device = loop_device_path(WORKER);

    let binding = LoopBinding::bind(staged_image(), &device).unwrap();
    assert_eq!(binding.device_path(), device);
    drop(binding);

    // A detached device accepts a fresh backing file without the busy path.
    let rebound = LoopBinding::bind(staged_image(), &device).unwrap();
    drop(rebound);
}

#[test]
#[ignore]
fn stale_binding_recovers_with_one_retry() {
    require_device();
    let device = loop_device_path(WORKER);

    // Simulate a crashed run: attach a backing file and leak the handles so
    // the device still holds it when bind() arrives.
    let stale = loopbox_sys::memfd::memfd_create(c"stale").unwrap();
    let devfd = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&device)
        .unwrap();
    loopbox_sys::loopdev::attach_backing(devfd.as_fd(), stale.as_fd()).unwrap();

    // bind() hits EBUSY, clears the stale attachment, and succeeds.
    let binding = LoopBinding::bind(staged_image(), &device).unwrap();
    drop(binding);
    drop(devfd);
}

#[test]
#[ignore]
fn failed_mount_still_detaches_the_device() {
    require_device();
    let target = tempfile::tempdir().unwrap();

    // The staged bytes are garbage, so ext4 refuses the mount.
    let request = MountRequest {
        fstype: "ext4",
        target: target.path(),
        size: 0x10_0000,
        segments: Some(vec![ImageSegment {
            data: b"not a filesystem",
            size: 16,
            offset: 0x400,
        }]),
        flags: 0,
        options: "nobarrier,errors=remount-ro",
    };
    let err = mount_image(request, WORKER).unwrap_err();
    assert!(matches!(err, MountError::Mount(_)));

    // Teardown happened: the device takes a new backing file immediately.
    let binding = LoopBinding::bind(staged_image(), &loop_device_path(WORKER)).unwrap();
    drop(binding);
}

#[test]
#[ignore]
fn sourceless_mount_returns_directory_handle() {
    let target = tempfile::tempdir().unwrap();
    let request = MountRequest {
        fstype: "tmpfs",
        target: target.path(),
        size: 0,
        segments: None,
        flags: 0,
        options: "size=64k",
    };

    let dir = mount_image(request, WORKER).unwrap();
    drop(dir);

    let target_c = std::ffi::CString::new(target.path().to_str().unwrap()).unwrap();
    // SAFETY: target_c is a valid NUL-terminated path.
    unsafe { libc::umount2(target_c.as_ptr(), libc::MNT_DETACH) };
}
