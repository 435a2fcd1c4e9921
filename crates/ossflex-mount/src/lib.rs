//! Mount lifecycle for exposing OSS buckets inside pod volume directories.
//!
//! Every driver invocation is a fresh process, so this crate keeps no state in
//! memory between calls. Everything it needs to know is re-derived from the
//! filesystem: the layout of the kubelet volume path, the system mount table,
//! and a shared credential file that ossfs reads.
//!
//! # Components
//!
//! - [`WorkloadIdentity`] - derives `(pod id, volume name)` from a mount path
//! - [`CredentialStore`] - the bucket-keyed `bucket:akId:akSecret` file
//! - [`VolumeOptions`] / [`VolumeRequest`] - typed, validated mount options
//! - [`MountTable`] - queries over `/proc/mounts`
//! - [`CommandRunner`] - the subprocess seam (ossfs, fusermount, systemd-run)
//! - [`Orchestrator`] - the mount and unmount state machine
//!
//! # Layout
//!
//! One ossfs mount is created per `(pod, volume)` pair under
//! [`DriverPaths::shared_mount_root`], named `<pod>~<volume>`. The pod's own
//! volume directory is then replaced with a symlink pointing at that mount,
//! or at a subdirectory of it when the volume requests a subpath.
//!
//! ```text
//! /var/lib/kubelet/pods/<pod>/volumes/alicloud~oss/<volume>
//!         │ (symlink)
//!         ▼
//! /oss/<pod>~<volume>[/<subpath>]      ◄── ossfs <bucket> /oss/<pod>~<volume>
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use ossflex_mount::{
//!     DriverPaths, FuseTools, KeyFileCredentials, Orchestrator, ProcMountTable, SystemRunner,
//!     VolumeOptions,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let paths = DriverPaths::default();
//! let options = VolumeOptions::from_json(r#"{"bucket":"logs","url":"oss-cn-hangzhou.aliyuncs.com"}"#)?;
//! let request = options.into_request(&KeyFileCredentials::new(&paths.ambient_key_dir))?;
//!
//! let table = ProcMountTable::new(&paths.mount_table);
//! let orchestrator = Orchestrator::new(paths, FuseTools::default(), SystemRunner, table);
//! orchestrator.mount(
//!     &request,
//!     Path::new("/var/lib/kubelet/pods/8f0c/volumes/alicloud~oss/logs"),
//! )?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cleanup;
mod command;
mod credentials;
mod error;
mod fuse_tools;
mod identity;
mod layout;
mod lock;
mod mount_table;
mod options;
mod orchestrator;
mod status;

pub use cleanup::{CleanupResult, cleanup_subpath_mounts, subpath_identity};
pub use command::{
    BUSY_SIGNATURE, CommandOutput, CommandRunner, CommandSpec, SystemRunner, UnmountFailure,
    classify_unmount_failure,
};
pub use credentials::{
    CREDENTIAL_FILE_MODE, CredentialRecord, CredentialStore, CredentialTable,
    DEFAULT_CREDENTIAL_FILE,
};
pub use error::{DriverError, Result};
pub use fuse_tools::{FuseTools, UnmountOutcome};
pub use identity::{IdentityError, MIN_SEGMENTS, WorkloadIdentity};
pub use layout::DriverPaths;
pub use lock::{DEFAULT_LOCK_TIMEOUT, FileLock};
pub use mount_table::{
    DEFAULT_MOUNT_TABLE, MountTable, ProcMountTable, SystemMount, parse_mount_table,
};
pub use options::{
    AccessKey, AmbientCredentials, KeyFileCredentials, OTHER_OPTS_PREFIX, ValidationError,
    VolumeOptions, VolumeRequest,
};
pub use orchestrator::Orchestrator;
pub use status::{Capabilities, DriverResult, Status};

/// Testing utilities shared by unit and integration tests.
///
/// Provides an in-memory stand-in for the host (subprocess runner plus mount
/// table) and a temporary directory tree shaped like a kubelet node.
pub mod testing;
