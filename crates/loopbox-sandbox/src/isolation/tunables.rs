//! System-V IPC kernel tunables written during sandbox entry.
//!
//! After the IPC and semaphore namespaces are unshared, the fresh
//! namespaces come up with kernel defaults; these writes pin them to the
//! values test cases were generated against. The writes go through an
//! abstract sink so hosts can redirect or observe them; failures are
//! fire-and-forget.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use rustix::io::Errno;

/// Abstract "set tunable value at path" collaborator.
pub trait TunableSink {
    fn set(&self, path: &Path, value: &str) -> io::Result<()>;
}

/// Writes tunables to the real procfs.
#[derive(Debug, Default)]
pub struct ProcfsTunables;

impl TunableSink for ProcfsTunables {
    fn set(&self, path: &Path, value: &str) -> io::Result<()> {
        // Open without create: a missing tunable means a missing kernel
        // feature, not a file to invent.
        let mut file = OpenOptions::new().write(true).open(path)?;
        file.write_all(value.as_bytes())
    }
}

/// The fixed shared-memory and message-queue tunables, in write order.
pub const SYSV_TUNABLES: &[(&str, &str)] = &[
    ("/proc/sys/kernel/shmmax", "16777216"),
    ("/proc/sys/kernel/shmall", "536870912"),
    ("/proc/sys/kernel/shmmni", "1024"),
    ("/proc/sys/kernel/msgmax", "8192"),
    ("/proc/sys/kernel/msgmni", "1024"),
    ("/proc/sys/kernel/msgmnb", "1024"),
    ("/proc/sys/kernel/sem", "1024 1048576 500 1024"),
];

/// Write the full tunable table through `sink`.
///
/// Every entry is attempted; the first error is returned afterwards so the
/// caller's policy can record it.
pub fn apply_defaults(sink: &dyn TunableSink) -> Result<(), Errno> {
    let mut first_err = None;
    for (path, value) in SYSV_TUNABLES {
        if let Err(err) = sink.set(Path::new(path), value) {
            let errno = Errno::from_raw_os_error(err.raw_os_error().unwrap_or(libc::EIO));
            tracing::debug!(path, %errno, "tunable write failed");
            first_err.get_or_insert(errno);
        }
    }
    match first_err {
        Some(errno) => Err(errno),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    struct Recording {
        writes: RefCell<Vec<(PathBuf, String)>>,
    }

    impl TunableSink for Recording {
        fn set(&self, path: &Path, value: &str) -> io::Result<()> {
            self.writes
                .borrow_mut()
                .push((path.to_path_buf(), value.to_string()));
            Ok(())
        }
    }

    struct AlwaysFails;

    impl TunableSink for AlwaysFails {
        fn set(&self, _path: &Path, _value: &str) -> io::Result<()> {
            Err(io::Error::from_raw_os_error(libc::EACCES))
        }
    }

    #[test]
    fn writes_full_table_in_order() {
        let sink = Recording {
            writes: RefCell::new(Vec::new()),
        };
        apply_defaults(&sink).unwrap();

        let writes = sink.writes.borrow();
        assert_eq!(writes.len(), SYSV_TUNABLES.len());
        assert_eq!(writes[0].0, Path::new("/proc/sys/kernel/shmmax"));
        assert_eq!(writes[0].1, "16777216");
        assert_eq!(writes[6].1, "1024 1048576 500 1024");
    }

    #[test]
    fn failures_are_collected_not_fatal() {
        // All writes fail; the first errno comes back, nothing panics.
        assert_eq!(apply_defaults(&AlwaysFails), Err(Errno::ACCESS));
    }

    #[test]
    fn procfs_sink_does_not_create_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let err = ProcfsTunables.set(&missing, "1").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!missing.exists());
    }
}
