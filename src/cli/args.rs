//! CLI argument definitions using clap
//!
//! Commands:
//! - ctrlserver serve [--config <path>] [--addr <host:port>] [--level <level>]
//! - ctrlserver config [--config <path>] [--addr <host:port>] [--level <level>]

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::observability::Level;

/// Standalone control-plane server over the process logger
#[derive(Parser, Debug)]
#[command(name = "ctrlserver")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the control server until interrupted
    Serve(ServerArgs),

    /// Print the effective configuration as JSON and exit
    Config(ServerArgs),
}

/// Flags shared by every command; each one overrides the config file
#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// Path to a JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bind address, e.g. "127.0.0.1:9090" or ":9090"
    #[arg(long)]
    pub addr: Option<String>,

    /// Initial log level
    #[arg(long)]
    pub level: Option<Level>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
