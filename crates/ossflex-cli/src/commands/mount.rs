//! Mount command - expose a bucket in a pod volume directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use ossflex_mount::{DriverResult, KeyFileCredentials, VolumeOptions};

use crate::config::Config;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Pod volume directory, e.g. /var/lib/kubelet/pods/<pod>/volumes/alicloud~oss/<volume>
    pub mount_dir: PathBuf,

    /// Volume options as a JSON object
    pub options: String,
}

#[instrument(level = "info", name = "cmd::mount", skip_all, fields(mount_dir = %args.mount_dir.display()))]
pub fn execute(args: &Args, config: &Config) -> Result<DriverResult> {
    let ambient = KeyFileCredentials::new(&config.paths.ambient_key_dir);
    let request = VolumeOptions::from_json(&args.options)
        .and_then(|options| options.into_request(&ambient))
        .context("Invalid volume options")?;

    super::build_orchestrator(config)
        .mount(&request, &args.mount_dir)
        .with_context(|| format!("Failed to mount {}", args.mount_dir.display()))?;

    Ok(DriverResult::success())
}
