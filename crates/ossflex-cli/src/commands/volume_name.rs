//! Getvolumename command.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use ossflex_mount::{DriverResult, VolumeOptions};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Volume options as a JSON object
    pub options: String,
}

/// Report `kubernetes.io/pvOrVolumeName` back to the kubelet.
pub fn execute(args: &Args) -> Result<DriverResult> {
    let options = VolumeOptions::from_json(&args.options).context("Invalid volume options")?;

    let result = DriverResult::success();
    if options.volume_name.is_empty() {
        return Ok(result);
    }
    Ok(result.with_volume_name(options.volume_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ossflex_mount::Status;

    #[test]
    fn test_reports_volume_name() {
        let args = Args {
            options: r#"{"kubernetes.io/pvOrVolumeName":"oss1","kubernetes.io/pod.uid":"p"}"#
                .to_string(),
        };
        let result = execute(&args).unwrap();
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.volume_name.as_deref(), Some("oss1"));
    }

    #[test]
    fn test_rejects_unknown_option() {
        let args = Args {
            options: r#"{"bukcet":"typo"}"#.to_string(),
        };
        assert!(execute(&args).is_err());
    }
}
