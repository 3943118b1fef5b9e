//! numsheet CLI: build and verify a corpus of number pages (0-999).
//!
//! Combines arithmetic facts with cached Wikidata references and short
//! Wikipedia excerpts, then checks the corpus' link integrity.

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
