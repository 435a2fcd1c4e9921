//! The shared ossfs credential file.
//!
//! ossfs reads AccessKeys from a single file with one `bucket:akId:akSecret`
//! line per bucket. Every mount rewrites the file in full: the mounted
//! bucket's line moves to the top and every other well-formed line is kept.
//! Lines for buckets that are no longer mounted are never removed.

use std::fmt;
use std::fs::{OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DriverError, Result};
use crate::lock::{DEFAULT_LOCK_TIMEOUT, FileLock};

/// Where ossfs looks for credentials by default.
pub const DEFAULT_CREDENTIAL_FILE: &str = "/etc/passwd-ossfs";

/// Owner read-write, group read. ossfs refuses world-readable files.
pub const CREDENTIAL_FILE_MODE: u32 = 0o640;

/// One `bucket:akId:akSecret` line.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    /// Bucket name
    pub bucket: String,
    /// AccessKey id
    pub ak_id: String,
    /// AccessKey secret
    pub ak_secret: String,
}

impl CredentialRecord {
    /// Build a record.
    pub fn new(
        bucket: impl Into<String>,
        ak_id: impl Into<String>,
        ak_secret: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            ak_id: ak_id.into(),
            ak_secret: ak_secret.into(),
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split(':');
        let (bucket, ak_id, ak_secret) = (fields.next()?, fields.next()?, fields.next()?);
        if fields.next().is_some() {
            return None;
        }
        Some(Self::new(bucket, ak_id, ak_secret))
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("bucket", &self.bucket)
            .field("ak_id", &self.ak_id)
            .field("ak_secret", &"[REDACTED]")
            .finish()
    }
}

/// The credential file as an ordered table, most recently upserted first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialTable {
    records: Vec<CredentialRecord>,
}

impl CredentialTable {
    /// Parse file content. Lines without exactly three fields are dropped.
    pub fn parse(contents: &str) -> Self {
        Self {
            records: contents.lines().filter_map(CredentialRecord::parse).collect(),
        }
    }

    /// Put `record` first, replacing any record for the same bucket.
    pub fn upsert(&mut self, record: CredentialRecord) {
        self.records.retain(|r| r.bucket != record.bucket);
        self.records.insert(0, record);
    }

    /// The record for `bucket`, if any.
    pub fn get(&self, bucket: &str) -> Option<&CredentialRecord> {
        self.records.iter().find(|r| r.bucket == bucket)
    }

    /// Records in file order.
    pub fn records(&self) -> &[CredentialRecord] {
        &self.records
    }

    /// File content, one newline-terminated line per record.
    pub fn render(&self) -> String {
        self.records
            .iter()
            .map(|r| format!("{}:{}:{}\n", r.bucket, r.ak_id, r.ak_secret))
            .collect()
    }
}

/// Handle to the credential file on disk.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl CredentialStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Override how long [`upsert`](Self::upsert) waits for the file lock.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// The credential file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".lock");
        PathBuf::from(path)
    }

    /// Read the table. A missing file is an empty table.
    pub fn load(&self) -> Result<CredentialTable> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(CredentialTable::parse(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CredentialTable::default()),
            Err(e) => Err(DriverError::io(
                "failed to read credential file",
                &self.path,
                e,
            )),
        }
    }

    /// Replace the file with `table`, restricting it to owner and group.
    pub fn save(&self, table: &CredentialTable) -> Result<()> {
        let write_err = |e| DriverError::io("failed to write credential file", &self.path, e);

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(CREDENTIAL_FILE_MODE)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(table.render().as_bytes())
            .map_err(write_err)?;
        // mode() only applies when the file is created
        file.set_permissions(Permissions::from_mode(CREDENTIAL_FILE_MODE))
            .map_err(write_err)?;

        Ok(())
    }

    /// Record `bucket`'s key pair, keeping every other bucket's line.
    pub fn upsert(&self, bucket: &str, ak_id: &str, ak_secret: &str) -> Result<()> {
        let _lock = FileLock::acquire(&self.lock_path(), self.lock_timeout)?;

        let mut table = self.load()?;
        table.upsert(CredentialRecord::new(bucket, ak_id, ak_secret));
        self.save(&table)?;

        tracing::info!(
            "Saved credentials for bucket {} to {}",
            bucket,
            self.path.display()
        );
        Ok(())
    }
}
