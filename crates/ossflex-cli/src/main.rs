#![deny(unsafe_code)]

mod commands;
mod config;
mod exit_code;
mod logging;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};

use ossflex_mount::{DriverError, DriverResult, IdentityError, ValidationError};

use crate::commands::{init, mount, unmount, unsupported, volume_name};
use crate::config::{Config, DEFAULT_CONFIG_PATH};

/// FlexVolume driver that mounts OSS buckets into pods through ossfs
#[derive(Parser)]
#[command(name = "ossflex")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Called by the kubelet from its volume plugin directory
    ossflex init
    ossflex mount /var/lib/kubelet/pods/<pod>/volumes/alicloud~oss/oss1 \\
        '{\"bucket\":\"logs\",\"url\":\"oss-cn-hangzhou.aliyuncs.com\"}'
    ossflex unmount /var/lib/kubelet/pods/<pod>/volumes/alicloud~oss/oss1
")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "OSSFLEX_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Verbosity level (-v, -vv); overrides the configured log level
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(rename_all = "lower")]
enum Commands {
    /// Report driver capabilities
    Init,

    /// Mount a bucket at a pod volume directory
    Mount(mount::Args),

    /// Unmount a pod volume directory
    Unmount(unmount::Args),

    /// Print the volume name from the options
    GetVolumeName(volume_name::Args),

    /// Not supported
    Attach(unsupported::Args),

    /// Not supported
    Detach(unsupported::Args),

    /// Not supported
    WaitForAttach(unsupported::Args),

    /// Not supported
    MountDevice(unsupported::Args),

    /// Not supported
    UnmountDevice(unsupported::Args),

    /// Not supported
    IsAttached(unsupported::Args),

    #[command(external_subcommand)]
    Other(Vec<String>),
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let message = e.to_string();
            let message = message.lines().next().unwrap_or("invalid arguments");
            return finish(DriverResult::failure(message), exit_code::USAGE_ERROR);
        }
    };

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => return finish(DriverResult::failure(format!("{e:#}")), categorize_error(&e)),
    };

    // Flushes the log file when dropped, after the result is printed
    let _log_guard = logging::init(&config.logging, cli.verbose);
    tracing::info!("Invoked: {}", logging::redact_args(std::env::args()));

    match run(cli.command, &config) {
        Ok(result) => {
            tracing::info!("Result: {:?}", result.status);
            finish(result, exit_code::SUCCESS)
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            finish(DriverResult::failure(format!("{e:#}")), categorize_error(&e))
        }
    }
}

fn run(command: Commands, config: &Config) -> Result<DriverResult> {
    match command {
        Commands::Init => Ok(init::execute()),
        Commands::Mount(args) => mount::execute(&args, config),
        Commands::Unmount(args) => unmount::execute(&args, config),
        Commands::GetVolumeName(args) => volume_name::execute(&args),
        Commands::Attach(_) => Ok(unsupported::execute("attach")),
        Commands::Detach(_) => Ok(unsupported::execute("detach")),
        Commands::WaitForAttach(_) => Ok(unsupported::execute("waitforattach")),
        Commands::MountDevice(_) => Ok(unsupported::execute("mountdevice")),
        Commands::UnmountDevice(_) => Ok(unsupported::execute("unmountdevice")),
        Commands::IsAttached(_) => Ok(unsupported::execute("isattached")),
        Commands::Other(args) => {
            let verb = args.first().map_or("", String::as_str);
            Ok(unsupported::execute(verb))
        }
    }
}

/// Print `result` as the single JSON line on stdout.
fn finish(result: DriverResult, code: u8) -> ExitCode {
    let printed = serde_json::to_string(&result)
        .context("Failed to encode result")
        .and_then(|json| {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}")?;
            stdout.flush()?;
            Ok(())
        });

    match printed {
        Ok(()) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(exit_code::GENERAL_ERROR)
        }
    }
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(driver_err) = cause.downcast_ref::<DriverError>() {
            match driver_err {
                DriverError::Validation(_) | DriverError::Parse(_) => {
                    return exit_code::USAGE_ERROR;
                }
                DriverError::Subprocess { .. } => return exit_code::MOUNT_FAILED,
                DriverError::Io { source, .. } => {
                    if let Some(code) = io_exit_code(source) {
                        return code;
                    }
                }
                DriverError::LockTimeout { .. } => return exit_code::GENERAL_ERROR,
            }
        }

        if cause.downcast_ref::<ValidationError>().is_some()
            || cause.downcast_ref::<IdentityError>().is_some()
            || cause.downcast_ref::<toml::de::Error>().is_some()
        {
            return exit_code::USAGE_ERROR;
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && let Some(code) = io_exit_code(io_err)
        {
            return code;
        }
    }

    exit_code::GENERAL_ERROR
}

fn io_exit_code(e: &io::Error) -> Option<u8> {
    match e.kind() {
        io::ErrorKind::PermissionDenied => Some(exit_code::PERMISSION_DENIED),
        io::ErrorKind::NotFound => Some(exit_code::NOT_FOUND),
        _ => None,
    }
}
