//! buildwright - builds container images from BuildRequests and rebuilds them on push
//!
//! Runs the BuildRequest controller and the push webhook server side by side.

use anyhow::Result;
use buildwright::cli::{self, Args, Command};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::Config { subcommand }) => {
            return cli::handle_config_command(subcommand, args.config.as_deref());
        }
        Some(Command::Version) => {
            cli::display_version();
            return Ok(());
        }
        Some(Command::Run) | None => {}
    }

    cli::init_logging(args.debug, args.log_json);
    tracing::debug!("Debug logging enabled");

    cli::run(args.config.as_deref()).await
}
