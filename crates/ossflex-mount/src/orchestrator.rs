//! Mount and unmount of one pod volume.
//!
//! # Mount
//!
//! 1. Return early if the pod volume directory is already a mount point
//! 2. Create the pod volume directory
//! 3. Record the bucket's AccessKey in the credential file
//! 4. Resolve `(pod, volume)` from the directory path
//! 5. Create `<shared_mount_root>/<pod>~<volume>` (under the identity lock
//!    from here on)
//! 6. Mount the bucket there unless it is already mounted
//! 7. Create the requested subpath and hand it to `uid:gid`
//! 8. Replace the pod volume directory with a symlink to the exposed path
//!
//! # Unmount
//!
//! 1. Release container subPath bind mounts (best effort)
//! 2. Remove the pod volume symlink
//! 3. Resolve `(pod, volume)` from the directory path
//! 4. Return early if the shared mount is gone (under the identity lock
//!    from here on)
//! 5. Unmount it, lazily if busy; a lazy detach ends the operation
//! 6. Remove the shared mount directory
//!
//! No step is rolled back when a later one fails. A second call with the
//! same arguments picks up from whatever state the first one left.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::unistd::{Gid, Uid, chown};

use crate::cleanup::cleanup_subpath_mounts;
use crate::command::CommandRunner;
use crate::credentials::CredentialStore;
use crate::error::{DriverError, Result};
use crate::fuse_tools::{FuseTools, UnmountOutcome};
use crate::identity::WorkloadIdentity;
use crate::layout::DriverPaths;
use crate::lock::{DEFAULT_LOCK_TIMEOUT, FileLock};
use crate::mount_table::MountTable;
use crate::options::VolumeRequest;

/// Drives the mount and unmount sequences against a host.
#[derive(Debug)]
pub struct Orchestrator<R, T> {
    paths: DriverPaths,
    tools: FuseTools,
    runner: R,
    table: T,
    lock_timeout: Duration,
}

impl<R: CommandRunner, T: MountTable> Orchestrator<R, T> {
    /// Create an orchestrator over the given node layout and host.
    pub fn new(paths: DriverPaths, tools: FuseTools, runner: R, table: T) -> Self {
        Self {
            paths,
            tools,
            runner,
            table,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Override how long to wait for the credential and identity locks.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Node layout in use.
    pub fn paths(&self) -> &DriverPaths {
        &self.paths
    }

    /// Expose `request`'s bucket at `target`.
    pub fn mount(&self, request: &VolumeRequest, target: &Path) -> Result<()> {
        let _span = tracing::info_span!("mount", target = %target.display()).entered();
        tracing::info!(
            "Mount request: volume={}, bucket={}, url={}, subpath={:?}, uid={}, gid={}, ak_id={}, flags={:?}",
            request.volume_name,
            request.bucket,
            request.url,
            request.subpath,
            request.uid,
            request.gid,
            request.credentials.id,
            request.extra_flags,
        );

        if self.table.is_mounted(target)? {
            tracing::info!("{} is already mounted", target.display());
            return Ok(());
        }

        prepare_target(target)?;

        CredentialStore::new(&self.paths.credential_file)
            .with_lock_timeout(self.lock_timeout)
            .upsert(
                &request.bucket,
                &request.credentials.id,
                request.credentials.secret(),
            )?;

        let identity = WorkloadIdentity::from_mount_path(target)?;
        let shared = self.paths.shared_mount_path(&identity);
        let _lock = FileLock::acquire(&self.paths.identity_lock_path(&identity), self.lock_timeout)?;

        std::fs::create_dir_all(&shared)
            .map_err(|e| DriverError::io("failed to create shared mount directory", &shared, e))?;

        if self.table.is_mounted(&shared)? {
            tracing::info!("Reusing existing mount at {}", shared.display());
        } else {
            self.tools.mount_bucket(&self.runner, request, &shared)?;
        }

        let exposed = match &request.subpath {
            Some(subpath) => {
                let dir = shared.join(subpath);
                prepare_subpath(&dir, request.uid, request.gid)?;
                dir
            }
            None => shared,
        };

        replace_with_symlink(target, &exposed)?;

        tracing::info!("Mounted {} at {}", exposed.display(), target.display());
        Ok(())
    }

    /// Tear down the volume at `target`.
    pub fn unmount(&self, target: &Path) -> Result<()> {
        let _span = tracing::info_span!("unmount", target = %target.display()).entered();

        let cleaned = cleanup_subpath_mounts(
            target,
            &self.paths,
            &self.runner,
            &self.tools,
            &self.table,
        );
        if !cleaned.is_empty() {
            let failed = cleaned.iter().filter(|r| !r.success).count();
            tracing::info!(
                "Processed {} subpath mounts ({} failed)",
                cleaned.len(),
                failed
            );
        }

        tracing::info!("Unlink {}", target.display());
        remove_target(target).map_err(|e| DriverError::io("failed to unlink", target, e))?;

        let identity = WorkloadIdentity::from_mount_path(target)?;
        let shared = self.paths.shared_mount_path(&identity);
        let lock = FileLock::acquire(&self.paths.identity_lock_path(&identity), self.lock_timeout)?;

        if !self.table.is_mounted(&shared)? {
            tracing::info!("{} is not mounted, nothing to do", shared.display());
            return lock.remove();
        }

        if self.tools.unmount(&self.runner, &shared)? == UnmountOutcome::LazilyDetached {
            return Ok(());
        }

        std::fs::remove_dir(&shared)
            .map_err(|e| DriverError::io("failed to remove shared mount directory", &shared, e))?;

        tracing::info!("Unmounted {}", target.display());
        lock.remove()
    }
}

/// Create the pod volume directory, or only its parent when a symlink from
/// an earlier call is already in place.
fn prepare_target(target: &Path) -> Result<()> {
    let dir: PathBuf = match std::fs::symlink_metadata(target) {
        Ok(meta) if meta.file_type().is_symlink() => match target.parent() {
            Some(parent) => parent.to_path_buf(),
            None => return Ok(()),
        },
        _ => target.to_path_buf(),
    };
    std::fs::create_dir_all(&dir)
        .map_err(|e| DriverError::io("failed to create mount directory", dir, e))
}

fn prepare_subpath(dir: &Path, uid: u32, gid: u32) -> Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| DriverError::io("failed to create subpath", dir, e))?;
    tracing::info!("Created subpath {}", dir.display());

    chown(dir, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
        .map_err(|errno| DriverError::io("failed to chown subpath", dir, errno.into()))?;
    tracing::info!("Changed owner of {} to {}:{}", dir.display(), uid, gid);
    Ok(())
}

/// Remove a symlink, or an empty directory, at `target`.
fn remove_target(target: &Path) -> std::io::Result<()> {
    if std::fs::symlink_metadata(target)?.file_type().is_symlink() {
        std::fs::remove_file(target)
    } else {
        std::fs::remove_dir(target)
    }
}

fn replace_with_symlink(target: &Path, exposed: &Path) -> Result<()> {
    remove_target(target)
        .map_err(|e| DriverError::io("failed to remove mount directory", target, e))?;
    std::os::unix::fs::symlink(exposed, target)
        .map_err(|e| DriverError::io("failed to create symlink", target, e))
}
