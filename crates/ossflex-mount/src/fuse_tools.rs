//! Invocations of ossfs, fusermount and systemd-run.
//!
//! The argument shapes here are what the rest of the node expects to see in
//! its process list and mount table, so they are kept stable:
//!
//! - `which systemd-run`
//! - `systemd-run --scope -- ossfs <bucket> <dir> -ourl=<url> -o allow_other <flags...>`
//! - `ossfs <bucket> <dir> -ourl=<url> -o allow_other <flags...>`
//! - `fusermount -u <dir>`, falling back to `fusermount -uz <dir>` when busy
//!
//! # Safety
//!
//! The unmount helpers do not check what is mounted at the path they are
//! given. Callers decide which paths belong to this driver.

use std::path::Path;

use serde::Deserialize;

use crate::command::{
    CommandOutput, CommandRunner, CommandSpec, UnmountFailure, classify_unmount_failure,
};
use crate::error::{DriverError, Result};
use crate::options::VolumeRequest;

/// Program names of the external tools.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FuseTools {
    /// The OSS FUSE client
    pub ossfs: String,
    /// FUSE unmount helper
    pub fusermount: String,
    /// Scope helper that moves ossfs out of the caller's cgroup
    pub systemd_run: String,
}

impl Default for FuseTools {
    fn default() -> Self {
        Self {
            ossfs: "ossfs".to_string(),
            fusermount: "fusermount".to_string(),
            systemd_run: "systemd-run".to_string(),
        }
    }
}

/// How an unmount completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountOutcome {
    /// Detached and released
    Unmounted,
    /// The mount was busy and was detached lazily
    LazilyDetached,
}

impl FuseTools {
    /// `which systemd-run`
    pub fn scope_probe(&self) -> CommandSpec {
        CommandSpec::new("which").arg(&self.systemd_run)
    }

    /// The ossfs command that mounts `request.bucket` at `target`.
    pub fn mount_command(&self, request: &VolumeRequest, target: &Path, scoped: bool) -> CommandSpec {
        let base = if scoped {
            CommandSpec::new(&self.systemd_run).args(["--scope", "--", self.ossfs.as_str()])
        } else {
            CommandSpec::new(&self.ossfs)
        };

        base.arg(&request.bucket)
            .arg(target.to_string_lossy())
            .arg(format!("-ourl={}", request.url))
            .args(["-o", "allow_other"])
            .args(request.extra_flags.iter().map(String::as_str))
    }

    /// `fusermount -u <target>`
    pub fn unmount_command(&self, target: &Path) -> CommandSpec {
        CommandSpec::new(&self.fusermount)
            .arg("-u")
            .arg(target.to_string_lossy())
    }

    /// `fusermount -uz <target>`
    pub fn lazy_unmount_command(&self, target: &Path) -> CommandSpec {
        CommandSpec::new(&self.fusermount)
            .arg("-uz")
            .arg(target.to_string_lossy())
    }

    /// Whether systemd-run is installed.
    pub fn scope_helper_available(&self, runner: &dyn CommandRunner) -> bool {
        match runner.run(&self.scope_probe()) {
            Ok(output) => output.success(),
            Err(e) => {
                tracing::debug!("which not available: {}", e);
                false
            }
        }
    }

    /// Mount `request.bucket` at `target`, inside a systemd scope when possible.
    ///
    /// Running under `systemd-run --scope` keeps the ossfs daemon alive after
    /// this short-lived driver process and its cgroup are gone.
    pub fn mount_bucket(
        &self,
        runner: &dyn CommandRunner,
        request: &VolumeRequest,
        target: &Path,
    ) -> Result<()> {
        let scoped = self.scope_helper_available(runner);
        if !scoped {
            tracing::info!("Mounting bucket without systemd-run");
        }

        let command = self.mount_command(request, target, scoped);
        tracing::info!("Mount with command: {}", command);
        run_checked(runner, &command)?;

        tracing::info!("Mounted bucket {} at {}", request.bucket, target.display());
        Ok(())
    }

    /// Unmount `target`, retrying once lazily if it is busy.
    pub fn unmount(&self, runner: &dyn CommandRunner, target: &Path) -> Result<UnmountOutcome> {
        let command = self.unmount_command(target);
        tracing::info!("Unmount with command: {}", command);

        let output = run(runner, &command)?;
        if output.success() {
            return Ok(UnmountOutcome::Unmounted);
        }

        match classify_unmount_failure(&output) {
            UnmountFailure::Busy => {
                let lazy = self.lazy_unmount_command(target);
                tracing::warn!("{} is busy, retrying with: {}", target.display(), lazy);
                run_checked(runner, &lazy)?;
                tracing::info!("Lazy unmount of {} succeeded", target.display());
                Ok(UnmountOutcome::LazilyDetached)
            }
            UnmountFailure::Other => Err(subprocess_error(&command, &output)),
        }
    }

    /// Single `fusermount -u` attempt without the busy fallback.
    pub fn try_unmount(&self, runner: &dyn CommandRunner, target: &Path) -> Result<()> {
        run_checked(runner, &self.unmount_command(target)).map(drop)
    }
}

fn run(runner: &dyn CommandRunner, command: &CommandSpec) -> Result<CommandOutput> {
    runner.run(command).map_err(|e| DriverError::Subprocess {
        command: command.to_string(),
        code: None,
        output: e.to_string(),
    })
}

fn run_checked(runner: &dyn CommandRunner, command: &CommandSpec) -> Result<CommandOutput> {
    let output = run(runner, command)?;
    if output.success() {
        Ok(output)
    } else {
        Err(subprocess_error(command, &output))
    }
}

fn subprocess_error(command: &CommandSpec, output: &CommandOutput) -> DriverError {
    DriverError::Subprocess {
        command: command.to_string(),
        code: output.code,
        output: output.combined(),
    }
}
