//! CLI module for ctrlserver
//!
//! Provides command-line interface for:
//! - serve: run a control server over the process logger
//! - config: print the effective configuration

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command, ServerArgs};
pub use commands::{resolve_config, run_command, serve, show_config};
pub use errors::{CliError, CliErrorCode, CliResult};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    run_command(Cli::parse_args().command)
}
