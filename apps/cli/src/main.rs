//! FreshDocs CLI: keeps generated topic explanations in sync with their
//! upstream documentation.
//!
//! Runs the sweep/cleanup scheduler, triggers one-off refreshes, and manages
//! the topic catalog and configuration.

mod catalog;
mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
