//! Where the driver keeps things on the node.

use std::path::PathBuf;

use serde::Deserialize;

use crate::credentials::DEFAULT_CREDENTIAL_FILE;
use crate::identity::WorkloadIdentity;
use crate::mount_table::DEFAULT_MOUNT_TABLE;

/// Node-local paths used by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverPaths {
    /// Parent of every shared bucket mount
    pub shared_mount_root: PathBuf,
    /// ossfs credential file
    pub credential_file: PathBuf,
    /// Kubelet state directory, parent of `pods/`
    pub kubelet_root: PathBuf,
    /// Directory for per-volume lock files
    pub lock_dir: PathBuf,
    /// Mount table in `/proc/mounts` format
    pub mount_table: PathBuf,
    /// Directory holding the node's default `akId` and `akSecret` files
    pub ambient_key_dir: PathBuf,
}

impl Default for DriverPaths {
    fn default() -> Self {
        Self {
            shared_mount_root: PathBuf::from("/oss"),
            credential_file: PathBuf::from(DEFAULT_CREDENTIAL_FILE),
            kubelet_root: PathBuf::from("/var/lib/kubelet"),
            lock_dir: PathBuf::from("/run/ossflex"),
            mount_table: PathBuf::from(DEFAULT_MOUNT_TABLE),
            ambient_key_dir: PathBuf::from("/etc/.volumeak"),
        }
    }
}

impl DriverPaths {
    /// `<shared_mount_root>/<pod>~<volume>`
    pub fn shared_mount_path(&self, identity: &WorkloadIdentity) -> PathBuf {
        self.shared_mount_root.join(identity.shared_mount_name())
    }

    /// Lock file guarding the shared mount of `identity`.
    pub fn identity_lock_path(&self, identity: &WorkloadIdentity) -> PathBuf {
        self.lock_dir
            .join(format!("{}.lock", identity.shared_mount_name()))
    }

    /// `<kubelet_root>/pods/<pod>/volume-subpaths/<volume>`, where the
    /// kubelet bind-mounts `subPath` volume mounts for containers.
    pub fn subpath_mount_root(&self, workload_id: &str, volume_name: &str) -> PathBuf {
        self.kubelet_root
            .join("pods")
            .join(workload_id)
            .join("volume-subpaths")
            .join(volume_name)
    }
}
