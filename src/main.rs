mod bridge;
mod catalog;
mod cli;
mod command;
mod desktop;
mod engine;
mod logging;
mod model;
mod orchestrator;
mod settings;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_headless = args.run.is_some();

    let code = cli::run(args).await?;
    // Headless runs mirror the child's exit status
    if is_headless {
        std::process::exit(code);
    }
    Ok(())
}
