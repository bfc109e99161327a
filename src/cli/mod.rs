//! CLI command handling module
//!
//! Handles all CLI subcommands and argument parsing.

mod commands;
mod logging;
mod version;

pub use commands::{ConfigSubcommand, handle_config_command, run};
pub use logging::init_logging;
pub use version::display_version;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// buildwright - builds container images from BuildRequests and rebuilds them on push
#[derive(Parser, Debug)]
#[command(name = "buildwright")]
#[command(about = "Builds container images from BuildRequests and rebuilds them on push", long_about = None)]
pub struct Args {
    /// Enable debug logging
    #[arg(long, short = 'd', global = true)]
    pub debug: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Main commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the controller and webhook server (default)
    Run,
    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
    /// Show version information
    Version,
}
