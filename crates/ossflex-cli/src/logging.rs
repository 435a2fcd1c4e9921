//! Log setup.
//!
//! stdout carries the JSON result the kubelet parses, so logs go to a
//! daily-rolling file under the configured directory. When that directory
//! cannot be created the driver logs to stderr instead.

use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "ossflex.log";

const REDACTED: &str = "***";

/// Install the global subscriber.
///
/// Returns a guard that flushes buffered log lines when dropped. Keep it
/// alive until the result has been printed.
pub fn init(config: &LoggingConfig, verbose: u8) -> Option<WorkerGuard> {
    let level = match verbose {
        0 => config.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let appender = std::fs::create_dir_all(&config.dir)
        .map_err(|e| e.to_string())
        .and_then(|()| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .build(&config.dir)
                .map_err(|e| e.to_string())
        });

    match appender {
        Ok(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
            tracing::warn!(
                "Cannot log to {}: {}, logging to stderr",
                config.dir.display(),
                e
            );
            None
        }
    }
}

/// Join the process arguments for logging, masking AccessKey secrets.
///
/// JSON option arguments keep their structure with secret values replaced.
/// Any other argument mentioning `akSecret` is masked whole.
pub fn redact_args<I>(args: I) -> String
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| redact_arg(&arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn redact_arg(arg: &str) -> String {
    if !arg.contains("akSecret") {
        return arg.to_string();
    }

    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(arg) {
        Ok(mut options) => {
            for (key, value) in &mut options {
                if key.ends_with("akSecret") {
                    *value = serde_json::Value::String(REDACTED.to_string());
                }
            }
            serde_json::Value::Object(options).to_string()
        }
        Err(_) => REDACTED.to_string(),
    }
}
