//! ThreadSync CLI — sync threaded annotations into a tabular store.
//!
//! Walks registered source documents, aggregates their comment threads,
//! and writes one record per new discussion.

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
