//! tunepull - Download playlist audio with a resumable, bounded queue

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod queue;
mod source;
mod utils;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "tunepull=debug"
    } else {
        "tunepull=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Fetch {
            url,
            output,
            concurrency,
            page_size,
            bulk,
        } => {
            cli::commands::fetch(url, output, concurrency, page_size, bulk).await?;
        }
        Commands::Status { output } => {
            cli::commands::status(output).await?;
        }
        Commands::Completion { shell } => {
            cli::commands::completion(shell);
        }
    }

    Ok(())
}
