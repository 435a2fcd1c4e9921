pub mod init;
pub mod mount;
pub mod unmount;
pub mod unsupported;
pub mod volume_name;

use ossflex_mount::{Orchestrator, ProcMountTable, SystemRunner};

use crate::config::Config;

/// Orchestrator over the real host, as configured.
fn build_orchestrator(config: &Config) -> Orchestrator<SystemRunner, ProcMountTable> {
    Orchestrator::new(
        config.paths.clone(),
        config.tools.clone(),
        SystemRunner,
        ProcMountTable::new(&config.paths.mount_table),
    )
}
