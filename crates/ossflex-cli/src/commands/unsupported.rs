//! Verbs of the attach phase, which this driver skips.

use clap::Args as ClapArgs;

use ossflex_mount::DriverResult;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Ignored
    #[arg(num_args = 0.., trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

pub fn execute(verb: &str) -> DriverResult {
    tracing::info!("{} is not supported", verb);
    DriverResult::not_supported()
}
