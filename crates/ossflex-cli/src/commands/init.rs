//! Init command - report driver capabilities.

use ossflex_mount::DriverResult;

/// The driver has no attach phase.
pub fn execute() -> DriverResult {
    tracing::info!("Init");
    DriverResult::init()
}
