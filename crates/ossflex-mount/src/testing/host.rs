//! In-memory host.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::Result;
use crate::mount_table::{MountTable, SystemMount};

/// Records commands and simulates their effect on a mount table.
///
/// - `which` succeeds only when the scope helper is enabled
/// - `ossfs` (direct or through `systemd-run`) mounts the path preceding the
///   `-ourl=` argument
/// - `fusermount -u`/`-uz` removes the mount, failing if it is absent
/// - anything else succeeds without effect
///
/// Scripted outputs queued with [`fail_next`](Self::fail_next) take
/// precedence and have no effect on the table. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

#[derive(Debug, Default)]
struct HostState {
    mounts: Vec<PathBuf>,
    calls: Vec<CommandSpec>,
    scripted: Vec<(Vec<String>, CommandOutput)>,
    scope_helper: bool,
}

impl FakeHost {
    /// An empty host without systemd-run.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pretend `path` is mounted.
    pub fn add_mount(&self, path: impl Into<PathBuf>) {
        self.state().mounts.push(path.into());
    }

    /// Whether `path` is currently in the fake table.
    pub fn has_mount(&self, path: impl AsRef<Path>) -> bool {
        self.state().mounts.iter().any(|m| m == path.as_ref())
    }

    /// Make `which systemd-run` succeed or fail.
    pub fn set_scope_helper(&self, available: bool) {
        self.state().scope_helper = available;
    }

    /// Answer the next command whose program and leading arguments equal
    /// `prefix` with `output`.
    pub fn fail_next(&self, prefix: &[&str], output: CommandOutput) {
        let prefix = prefix.iter().map(|s| (*s).to_string()).collect();
        self.state().scripted.push((prefix, output));
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.state().calls.clone()
    }

    /// Commands run so far whose program is `program`.
    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.program() == program)
            .collect()
    }
}

fn words(spec: &CommandSpec) -> Vec<&str> {
    std::iter::once(spec.program())
        .chain(spec.arguments().iter().map(String::as_str))
        .collect()
}

fn program_name(spec: &CommandSpec) -> &str {
    Path::new(spec.program())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
}

impl HostState {
    fn take_scripted(&mut self, spec: &CommandSpec) -> Option<CommandOutput> {
        let words = words(spec);
        let index = self.scripted.iter().position(|(prefix, _)| {
            prefix.len() <= words.len() && prefix.iter().zip(&words).all(|(p, w)| p == w)
        })?;
        Some(self.scripted.remove(index).1)
    }

    fn simulate(&mut self, spec: &CommandSpec) -> CommandOutput {
        let args = spec.arguments();
        match program_name(spec) {
            "which" if self.scope_helper => CommandOutput {
                code: Some(0),
                stdout: format!("/usr/bin/{}\n", args.first().map_or("", String::as_str)),
                stderr: String::new(),
            },
            "which" => CommandOutput::failed(1, ""),
            "ossfs" | "systemd-run" => {
                let target = args
                    .iter()
                    .position(|a| a.starts_with("-ourl="))
                    .and_then(|i| i.checked_sub(1))
                    .map(|i| PathBuf::from(&args[i]));
                match target {
                    Some(target) => {
                        self.mounts.push(target);
                        CommandOutput::ok()
                    }
                    None => CommandOutput::failed(1, "ossfs: missing parameter"),
                }
            }
            "fusermount" => {
                let Some(target) = args.get(1).map(PathBuf::from) else {
                    return CommandOutput::failed(1, "fusermount: missing mountpoint");
                };
                match self.mounts.iter().position(|m| *m == target) {
                    Some(index) => {
                        self.mounts.remove(index);
                        CommandOutput::ok()
                    }
                    None => CommandOutput::failed(
                        1,
                        format!(
                            "fusermount: entry for {} not found in /etc/mtab",
                            target.display()
                        ),
                    ),
                }
            }
            _ => CommandOutput::ok(),
        }
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let mut state = self.state();
        state.calls.push(spec.clone());
        if let Some(output) = state.take_scripted(spec) {
            return Ok(output);
        }
        Ok(state.simulate(spec))
    }
}

impl MountTable for FakeHost {
    fn mounts(&self) -> Result<Vec<SystemMount>> {
        Ok(self
            .state()
            .mounts
            .iter()
            .map(|m| SystemMount {
                mountpoint: m.clone(),
                fstype: "fuse.ossfs".to_string(),
                fsname: "ossfs".to_string(),
            })
            .collect())
    }
}
