//! sitecrawler CLI — same-host concurrent site crawler.
//!
//! Walks every reachable page of one host and prints a per-link
//! reachability report as a sitemap or JSON.

mod commands;
mod render;

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
