//! Binary crate for the `sunnyspots` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Human-friendly output formatting
//! - Serving the tile and photo proxy

use clap::Parser;

mod cli;
mod logging;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init()?;
    let cmd = cli::Cli::parse();
    cmd.run().await
}
