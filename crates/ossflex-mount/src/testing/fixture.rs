//! Temporary node layout.

use std::fs;
use std::path::PathBuf;

use nix::unistd::{getegid, geteuid};
use tempfile::TempDir;

use crate::layout::DriverPaths;
use crate::options::{AccessKey, AmbientCredentials};

/// A temporary directory tree shaped like a node running the driver.
///
/// ```text
/// <root>/
/// ├── etc/passwd-ossfs
/// ├── etc/volumeak/{akId,akSecret}
/// ├── kubelet/pods/<pod>/volumes/alicloud~oss/<volume>
/// ├── oss/<pod>~<volume>
/// ├── proc-mounts
/// └── run/ossflex/*.lock
/// ```
///
/// The directory is removed when the fixture is dropped.
///
/// # Panics
///
/// Constructors and helpers panic on I/O errors.
#[derive(Debug)]
pub struct DriverFixture {
    _temp: TempDir,
    paths: DriverPaths,
}

impl DriverFixture {
    /// Create a fresh tree.
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        // Canonical so symlink resolution compares equal to recorded mounts
        let root = fs::canonicalize(temp.path()).expect("canonicalize temp dir");

        let paths = DriverPaths {
            shared_mount_root: root.join("oss"),
            credential_file: root.join("etc/passwd-ossfs"),
            kubelet_root: root.join("kubelet"),
            lock_dir: root.join("run/ossflex"),
            mount_table: root.join("proc-mounts"),
            ambient_key_dir: root.join("etc/volumeak"),
        };
        fs::create_dir_all(root.join("etc")).expect("create etc");
        fs::create_dir_all(&paths.shared_mount_root).expect("create shared mount root");

        Self {
            _temp: temp,
            paths,
        }
    }

    /// The layout rooted in this tree.
    pub fn paths(&self) -> &DriverPaths {
        &self.paths
    }

    /// `kubelet/pods/<pod>/volumes/alicloud~oss/<volume>`, with its parent
    /// created and the directory itself left absent.
    pub fn pod_volume_dir(&self, pod: &str, volume: &str) -> PathBuf {
        let parent = self
            .paths
            .kubelet_root
            .join("pods")
            .join(pod)
            .join("volumes")
            .join("alicloud~oss");
        fs::create_dir_all(&parent).expect("create pod volume parent");
        parent.join(volume)
    }

    /// `kubelet/pods/<pod>/volume-subpaths/<volume>`, created.
    pub fn subpath_root(&self, pod: &str, volume: &str) -> PathBuf {
        let root = self.paths.subpath_mount_root(pod, volume);
        fs::create_dir_all(&root).expect("create subpath root");
        root
    }

    /// Write the node's ambient `akId` and `akSecret` files.
    pub fn write_ambient_keys(&self, id: &str, secret: &str) {
        fs::create_dir_all(&self.paths.ambient_key_dir).expect("create ambient key dir");
        fs::write(self.paths.ambient_key_dir.join("akId"), id).expect("write akId");
        fs::write(self.paths.ambient_key_dir.join("akSecret"), secret).expect("write akSecret");
    }

    /// Contents of the credential file, empty if it does not exist.
    pub fn credential_file(&self) -> String {
        fs::read_to_string(&self.paths.credential_file).unwrap_or_default()
    }

    /// Effective uid and gid of this process, which it may always chown to.
    pub fn owner(&self) -> (u32, u32) {
        (geteuid().as_raw(), getegid().as_raw())
    }
}

impl Default for DriverFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Ambient credentials fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    id: String,
    secret: String,
}

impl StaticCredentials {
    /// Always return `id`/`secret`.
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }
}

impl AmbientCredentials for StaticCredentials {
    fn access_key(&self) -> AccessKey {
        AccessKey::new(&self.id, &self.secret)
    }
}
