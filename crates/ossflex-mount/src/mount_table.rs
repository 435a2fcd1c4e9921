//! System mount table queries.
//!
//! Whether a path is "an active mount point" is answered from the kernel's
//! mount table, read in `/proc/mounts` format:
//!
//! `{device} {mountpoint} {fstype} {options} {dump} {pass}`
//!
//! e.g. `ossfs /oss/e000259c~oss1 fuse.ossfs rw,nosuid,nodev,allow_other 0 0`

use std::path::{Path, PathBuf};

use crate::error::{DriverError, Result};

/// Default location of the mount table.
pub const DEFAULT_MOUNT_TABLE: &str = "/proc/mounts";

/// One entry of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemMount {
    /// The mount point path (e.g. `/oss/e000259c~oss1`)
    pub mountpoint: PathBuf,
    /// The filesystem type (e.g. `fuse.ossfs`)
    pub fstype: String,
    /// The filesystem name / device (e.g. `ossfs`)
    pub fsname: String,
}

/// Read access to the system mount table.
pub trait MountTable {
    /// Every current mount.
    fn mounts(&self) -> Result<Vec<SystemMount>>;

    /// Whether `path` is a mount point.
    ///
    /// A symlink counts when its resolved target is a mount point, so a pod
    /// volume directory that was already redirected to a bucket mount reads
    /// as mounted.
    fn is_mounted(&self, path: &Path) -> Result<bool> {
        let resolved = std::fs::canonicalize(path).ok();
        Ok(self.mounts()?.iter().any(|m| {
            m.mountpoint == path || resolved.as_deref() == Some(m.mountpoint.as_path())
        }))
    }

    /// Mount points at or below the directory `prefix`.
    ///
    /// Compared by path component, so `/a/oss1` does not cover `/a/oss10/x`.
    fn mounts_under(&self, prefix: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .mounts()?
            .into_iter()
            .filter(|m| m.mountpoint.starts_with(prefix))
            .map(|m| m.mountpoint)
            .collect())
    }
}

/// Mount table backed by a `/proc/mounts`-format file.
#[derive(Debug, Clone)]
pub struct ProcMountTable {
    path: PathBuf,
}

impl ProcMountTable {
    /// Read the table from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The running kernel's table.
    pub fn system() -> Self {
        Self::new(DEFAULT_MOUNT_TABLE)
    }
}

impl Default for ProcMountTable {
    fn default() -> Self {
        Self::system()
    }
}

impl MountTable for ProcMountTable {
    fn mounts(&self) -> Result<Vec<SystemMount>> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| DriverError::io("failed to read mount table", &self.path, e))?;
        Ok(parse_mount_table(&contents))
    }
}

/// Parse `/proc/mounts` content, skipping malformed lines.
pub fn parse_mount_table(contents: &str) -> Vec<SystemMount> {
    contents.lines().filter_map(parse_mount_line).collect()
}

fn parse_mount_line(line: &str) -> Option<SystemMount> {
    let mut parts = line.split_whitespace();
    let fsname = parts.next()?;
    let mountpoint = parts.next()?;
    let fstype = parts.next()?;

    Some(SystemMount {
        mountpoint: PathBuf::from(unescape_mount_path(mountpoint)),
        fstype: fstype.to_string(),
        fsname: unescape_mount_path(fsname),
    })
}

/// Undo the octal escapes the kernel applies to mount table fields.
///
/// - `\040` = space
/// - `\011` = tab
/// - `\012` = newline
/// - `\134` = backslash
fn unescape_mount_path(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(idx) = rest.find('\\') {
        result.push_str(&rest[..idx]);
        let escape = &rest[idx + 1..];
        let digits = escape
            .get(..3)
            .filter(|d| d.bytes().all(|b| (b'0'..=b'7').contains(&b)));

        match digits.and_then(|d| u8::from_str_radix(d, 8).ok()) {
            Some(code) => {
                result.push(char::from(code));
                rest = &escape[3..];
            }
            None => {
                result.push('\\');
                rest = escape;
            }
        }
    }
    result.push_str(rest);

    result
}
