//! NeoLabs CLI: find and track newly founded AI research labs.
//!
//! Collects news, VC and search sources, resolves the companies they are
//! about, stores them, and reports recall against a benchmark list.

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
