//! Advisory file locks between concurrent driver invocations.
//!
//! The kubelet may run several driver processes at once. Read-modify-write
//! of the credential file and the check-then-mount of a shared bucket mount
//! are serialized with an exclusive `flock` on a side file.
//!
//! A holder may unlink its lock file with [`FileLock::remove`] before
//! releasing it. Waiters that locked the unlinked file notice that the path
//! no longer names their inode and start over on a fresh file.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{DriverError, Result};

/// Default timeout for acquiring a lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An exclusive lock held until dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Lock `path`, creating it and its parent directory if needed.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DriverError::io("failed to create lock directory", parent, e))?;
        }

        let start = Instant::now();
        let file = loop {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(path)
                .map_err(|e| DriverError::io("failed to open lock file", path, e))?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    if names_same_file(&file, path)? {
                        break file;
                    }
                    // Removed by its previous holder after we opened it
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > timeout {
                        return Err(DriverError::LockTimeout {
                            path: path.to_path_buf(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(DriverError::io("failed to lock", path, e)),
            }
        };

        tracing::debug!("Acquired lock {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// The lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlink the lock file, then release the lock.
    pub fn remove(self) -> Result<()> {
        std::fs::remove_file(&self.path)
            .map_err(|e| DriverError::io("failed to remove lock file", &self.path, e))?;
        tracing::debug!("Removed lock {}", self.path.display());
        Ok(())
    }
}

/// Whether `path` still names the open `file`.
fn names_same_file(file: &File, path: &Path) -> Result<bool> {
    let held = file
        .metadata()
        .map_err(|e| DriverError::io("failed to stat lock file", path, e))?;
    match std::fs::metadata(path) {
        Ok(current) => Ok(current.dev() == held.dev() && current.ino() == held.ino()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DriverError::io("failed to stat lock file", path, e)),
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
