//! jecsctl (jecs) - synthesizes Jenkins on ECS stacks.
//!
//! Reads a settings file and the credential environment, builds the stack
//! and writes the deployment template and its manifest.

use anyhow::Result;
use clap::Parser;

mod commands;
mod error;
mod logging;
mod output;

use commands::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format(), cli.log_level());

    if let Err(e) = cli.run() {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
