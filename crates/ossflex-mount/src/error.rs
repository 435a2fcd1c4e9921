//! Error type shared by every driver operation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::identity::IdentityError;
use crate::options::ValidationError;

/// Errors returned by mount and unmount operations.
///
/// All of them are fatal for the invocation that produced them. Nothing that
/// was already committed earlier in the same operation is rolled back.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Malformed or missing volume options
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The mount path does not follow the kubelet layout
    #[error(transparent)]
    Parse(#[from] IdentityError),

    /// A filesystem step failed
    #[error("{context} {}: {source}", .path.display())]
    Io {
        /// What the driver was doing
        context: &'static str,
        /// The path it was operating on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// An external tool exited unsuccessfully or could not be started
    #[error("`{command}` failed ({}): {}", describe_code(.code), .output.trim())]
    Subprocess {
        /// The command line that was run
        command: String,
        /// Exit code, if the process ran to completion
        code: Option<i32>,
        /// Captured stderr and stdout
        output: String,
    },

    /// Another invocation held a lock for too long
    #[error("timed out waiting for lock {}", .path.display())]
    LockTimeout {
        /// The lock file
        path: PathBuf,
    },
}

/// Result alias for driver operations.
pub type Result<T, E = DriverError> = std::result::Result<T, E>;

impl DriverError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// The underlying I/O error kind, for errors that have one.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

#[allow(clippy::ref_option)]
fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "did not run to completion".to_string(),
    }
}
