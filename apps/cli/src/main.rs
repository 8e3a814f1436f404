//! Distiller CLI — turn a batch of free-text records into markdown
//! knowledge articles via taxonomy discovery, classification, and
//! synthesis over a pluggable LLM backend.

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
