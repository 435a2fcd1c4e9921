//! Unmount command - tear down a pod volume.
//!
//! Only the directory is passed; everything else is recovered from its path
//! and the mount table.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use ossflex_mount::DriverResult;

use crate::config::Config;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Pod volume directory
    pub mount_dir: PathBuf,
}

#[instrument(level = "info", name = "cmd::unmount", skip_all, fields(mount_dir = %args.mount_dir.display()))]
pub fn execute(args: &Args, config: &Config) -> Result<DriverResult> {
    super::build_orchestrator(config)
        .unmount(&args.mount_dir)
        .with_context(|| format!("Failed to unmount {}", args.mount_dir.display()))?;

    Ok(DriverResult::success())
}
