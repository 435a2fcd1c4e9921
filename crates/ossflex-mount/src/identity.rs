//! Pod and volume identity derived from a kubelet mount path.
//!
//! The kubelet hands the driver a path shaped like
//! `<root>/pods/<pod-id>/volumes/<driver>/<volume-name>` and nothing else
//! that survives until unmount. Identity is therefore read positionally from
//! that path: the pod id is the fourth segment from the end and the volume
//! name is the last. The literal `pods` and `volumes` markers are not checked.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Minimum number of `/`-separated segments a mount path must have.
///
/// The leading empty segment of an absolute path counts, so `/a/b/c/d`
/// has exactly five.
pub const MIN_SEGMENTS: usize = 5;

/// A mount path that does not follow the positional convention.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "failed to derive pod and volume from mount path {}: expected at least 5 path segments, found {found}",
    .path.display()
)]
pub struct IdentityError {
    path: PathBuf,
    found: usize,
}

/// The `(pod id, volume name)` pair a mount path belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadIdentity {
    workload_id: String,
    volume_name: String,
}

impl WorkloadIdentity {
    /// Build an identity from its parts.
    pub fn new(workload_id: impl Into<String>, volume_name: impl Into<String>) -> Self {
        Self {
            workload_id: workload_id.into(),
            volume_name: volume_name.into(),
        }
    }

    /// Resolve the identity of a kubelet mount path.
    ///
    /// ```
    /// use std::path::Path;
    /// use ossflex_mount::WorkloadIdentity;
    ///
    /// let id = WorkloadIdentity::from_mount_path(Path::new(
    ///     "/var/lib/kubelet/pods/ABC/volumes/driver/vol1",
    /// ))
    /// .unwrap();
    /// assert_eq!(id.workload_id(), "ABC");
    /// assert_eq!(id.volume_name(), "vol1");
    /// ```
    pub fn from_mount_path(path: &Path) -> Result<Self, IdentityError> {
        let segments = normalized_segments(path);
        let found = segments.len();
        if found < MIN_SEGMENTS {
            return Err(IdentityError {
                path: path.to_path_buf(),
                found,
            });
        }

        Ok(Self {
            workload_id: segments[found - 4].clone(),
            volume_name: segments[found - 1].clone(),
        })
    }

    /// The pod id.
    pub fn workload_id(&self) -> &str {
        &self.workload_id
    }

    /// The logical volume name.
    pub fn volume_name(&self) -> &str {
        &self.volume_name
    }

    /// Directory name of the shared ossfs mount for this pair.
    pub fn shared_mount_name(&self) -> String {
        format!("{}~{}", self.workload_id, self.volume_name)
    }
}

/// Lexically clean `path` and split it into segments.
///
/// `.` and repeated separators are dropped and `..` consumes the segment
/// before it. An absolute path starts with one empty segment for the root.
fn normalized_segments(path: &Path) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    let mut rooted = false;

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                rooted = true;
                segments.clear();
                segments.push(String::new());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = segments
                    .last()
                    .is_some_and(|last| !last.is_empty() && last != "..");
                if can_pop {
                    segments.pop();
                } else if !rooted {
                    segments.push("..".to_string());
                }
            }
            Component::Normal(name) => segments.push(name.to_string_lossy().into_owned()),
        }
    }

    segments
}
