//! Best-effort cleanup of container subPath mounts.
//!
//! When a container mounts the volume with `subPath`, the kubelet bind-mounts
//! the subdirectory under
//! `/var/lib/kubelet/pods/<pod>/volume-subpaths/<volume>/<container>/<index>`.
//! Those bind mounts pin the pod volume directory, so they are released
//! before the volume itself is torn down.
//!
//! Nothing here fails the unmount: every error is logged and reported in the
//! returned [`CleanupResult`]s.

use std::path::{Path, PathBuf};

use crate::command::CommandRunner;
use crate::fuse_tools::FuseTools;
use crate::layout::DriverPaths;
use crate::mount_table::MountTable;

/// Outcome for one subPath mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupResult {
    /// The mount point that was processed
    pub mountpoint: PathBuf,
    /// Whether the unmount succeeded
    pub success: bool,
    /// Error message if the unmount failed
    pub error: Option<String>,
}

/// Pod id and volume name of a kubelet volume path, by marker search.
///
/// The pod id is whatever sits between the first `pods` and the following
/// `volumes` with the surrounding slashes stripped. The volume name is the
/// last path component.
///
/// ```
/// use std::path::Path;
/// use ossflex_mount::subpath_identity;
///
/// let path = Path::new("/var/lib/kubelet/pods/6dd977d1/volumes/alicloud~oss/oss1");
/// assert_eq!(
///     subpath_identity(path),
///     Some(("6dd977d1".to_string(), "oss1".to_string()))
/// );
/// ```
pub fn subpath_identity(target: &Path) -> Option<(String, String)> {
    let volume_name = target.file_name()?.to_string_lossy().into_owned();

    let raw = target.to_string_lossy();
    let (_, after_pods) = raw.split_once("pods")?;
    let (between, _) = after_pods.split_once("volumes")?;

    let workload_id = between.trim_matches('/');
    if workload_id.is_empty() {
        return None;
    }
    Some((workload_id.to_string(), volume_name))
}

/// Unmount every subPath bind mount belonging to the volume at `target`.
///
/// Returns one result per mount point found. Paths that do not look like a
/// kubelet volume path, or whose subPath directory does not exist, yield no
/// results.
pub fn cleanup_subpath_mounts(
    target: &Path,
    paths: &DriverPaths,
    runner: &dyn CommandRunner,
    tools: &FuseTools,
    table: &dyn MountTable,
) -> Vec<CleanupResult> {
    let Some((workload_id, volume_name)) = subpath_identity(target) else {
        tracing::debug!("No pod id in {}, skipping subpath cleanup", target.display());
        return Vec::new();
    };

    let root = paths.subpath_mount_root(&workload_id, &volume_name);
    if !root.exists() {
        return Vec::new();
    }

    let mountpoints = match table.mounts_under(&root) {
        Ok(mountpoints) => mountpoints,
        Err(e) => {
            tracing::warn!("Failed to list subpath mounts under {}: {}", root.display(), e);
            return Vec::new();
        }
    };

    mountpoints
        .into_iter()
        .map(|mountpoint| match tools.try_unmount(runner, &mountpoint) {
            Ok(()) => {
                tracing::info!("Unmounted subpath mount {}", mountpoint.display());
                CleanupResult {
                    mountpoint,
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                tracing::info!("Unmount of subpath {} failed: {}", mountpoint.display(), e);
                CleanupResult {
                    mountpoint,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect()
}
