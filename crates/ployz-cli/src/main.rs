//! ployz CLI - operator-facing entry point for the deploy engine.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ployz=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan(args) => commands::plan::run(&args),
        Commands::Apply(args) => commands::apply::run(&args).await,
        Commands::DescribePhase(args) => commands::describe_phase::run(&args),
        Commands::Version => {
            println!("ployz {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
