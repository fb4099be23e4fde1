//! Per-filesystem mount option normalization.
//!
//! A few filesystem families need their flags or option string adjusted
//! before `mount(2)` or the attempt fails for reasons unrelated to the image
//! under test:
//!
//! | Family | Adjustment |
//! |--------|-----------|
//! | `iso9660` | force `MS_RDONLY` (the driver rejects writable mounts) |
//! | `ext*` | default to `errors=continue` when no `errors=` mode is given |
//! | `xfs` | add `nouuid` so images cloned from one template all mount |
//!
//! Options are parsed into a structured list and rendered exactly once at
//! the end. The rendered string stays within a fixed capacity with room
//! reserved for the appended suffix; over-long caller input loses entries
//! from its tail instead of overrunning anything.

/// Capacity of the rendered option string, matching the kernel-side page
/// the harness historically used.
pub const OPTIONS_CAPACITY: usize = 256;

/// Tail space reserved so an appended default always fits.
const APPEND_RESERVE: usize = 32;

/// Parsed `name[=value]` mount options, in caller order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    entries: Vec<(String, Option<String>)>,
}

impl MountOptions {
    /// Parse a comma-separated option string. Empty items are dropped.
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .split(',')
            .filter(|item| !item.is_empty())
            .map(|item| match item.split_once('=') {
                Some((name, value)) => (name.to_string(), Some(value.to_string())),
                None => (item.to_string(), None),
            })
            .collect();
        Self { entries }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn push(&mut self, name: &str, value: Option<&str>) {
        self.entries
            .push((name.to_string(), value.map(str::to_string)));
    }

    /// Drop entries from the tail until the rendered form fits `cap` bytes.
    fn truncate_rendered(&mut self, cap: usize) {
        while self.rendered_len() > cap {
            self.entries.pop();
        }
    }

    fn rendered_len(&self) -> usize {
        let payload: usize = self
            .entries
            .iter()
            .map(|(n, v)| n.len() + v.as_ref().map_or(0, |v| v.len() + 1))
            .sum();
        let separators = self.entries.len().saturating_sub(1);
        payload + separators
    }

    /// Serialize back to the comma-separated wire format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.rendered_len());
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(name);
            if let Some(value) = value {
                out.push('=');
                out.push_str(value);
            }
        }
        out
    }
}

/// Adjust mount flags and options for the given filesystem type.
///
/// Types outside the special-cased families pass through unchanged.
/// Normalization is idempotent: feeding its own output back in yields the
/// same flags and string.
pub fn normalize_options(
    fstype: &str,
    flags: libc::c_ulong,
    raw: &str,
) -> (libc::c_ulong, String) {
    let mut flags = flags;
    let mut opts = MountOptions::parse(raw);
    opts.truncate_rendered(OPTIONS_CAPACITY - APPEND_RESERVE);

    if fstype == "iso9660" {
        flags |= libc::MS_RDONLY;
    } else if fstype.starts_with("ext") {
        // Default to continue-on-error unless the caller picked a mode.
        if !opts.contains("errors") {
            opts.push("errors", Some("continue"));
        }
    } else if fstype == "xfs" && !opts.contains("nouuid") {
        opts.push("nouuid", None);
    }

    (flags, opts.render())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext4_with_error_mode_is_untouched() {
        let raw = "nobarrier,errors=remount-ro";
        let (flags, opts) = normalize_options("ext4", 0, raw);
        assert_eq!(flags, 0);
        assert_eq!(opts, raw);
    }

    #[test]
    fn ext4_without_error_mode_gets_default() {
        let (_, opts) = normalize_options("ext4", 0, "nobarrier");
        assert_eq!(opts, "nobarrier,errors=continue");
    }

    #[test]
    fn ext4_panic_mode_counts_as_present() {
        let (_, opts) = normalize_options("ext4", 0, "errors=panic");
        assert_eq!(opts, "errors=panic");
    }

    #[test]
    fn normalization_is_idempotent() {
        let (flags, once) = normalize_options("ext4", 0, "data=journal");
        let (flags2, twice) = normalize_options("ext4", flags, &once);
        assert_eq!(once, twice);
        assert_eq!(flags, flags2);
    }

    #[test]
    fn ext2_family_prefix_matches() {
        let (_, opts) = normalize_options("ext2", 0, "");
        assert_eq!(opts, "errors=continue");
    }

    #[test]
    fn iso9660_forces_read_only() {
        let (flags, opts) = normalize_options("iso9660", 0, "norock");
        assert_ne!(flags & libc::MS_RDONLY, 0);
        assert_eq!(opts, "norock");
    }

    #[test]
    fn xfs_gains_nouuid_once() {
        let (_, opts) = normalize_options("xfs", 0, "noquota");
        assert_eq!(opts, "noquota,nouuid");
        let (_, again) = normalize_options("xfs", 0, &opts);
        assert_eq!(again, opts);
    }

    #[test]
    fn unknown_type_passes_through() {
        let raw = "uid=0,gid=0";
        let (flags, opts) = normalize_options("vfat", 0x20, raw);
        assert_eq!(flags, 0x20);
        assert_eq!(opts, raw);
    }

    #[test]
    fn overlong_input_is_truncated_not_overrun() {
        let raw: Vec<String> = (0..60).map(|i| format!("opt{i}=value{i}")).collect();
        let raw = raw.join(",");
        assert!(raw.len() > OPTIONS_CAPACITY);

        let (_, opts) = normalize_options("ext4", 0, &raw);
        assert!(opts.len() <= OPTIONS_CAPACITY);
        // The appended default survives truncation of the caller's tail.
        assert!(opts.ends_with("errors=continue"));
    }

    #[test]
    fn empty_options_render_cleanly() {
        let (_, opts) = normalize_options("vfat", 0, "");
        assert_eq!(opts, "");
        let (_, opts) = normalize_options("ext4", 0, "");
        assert_eq!(opts, "errors=continue");
    }
}
