//! CLI for sensorbench
//!
//! Runs the storage benchmark as a whole or one phase at a time:
//! - run: provision, insert, then query
//! - provision: drop and recreate every backend
//! - insert: load the dataset week by week
//! - query: run the query battery for the configured rounds

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "sensorbench")]
#[command(about = "Cross-engine storage benchmark for sensor time series", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision, insert and query every backend
    Run(commands::run::RunArgs),

    /// Drop and recreate every backend (resets the insertion file)
    Provision(commands::provision::ProvisionArgs),

    /// Load the dataset into every backend
    Insert(commands::insert::InsertArgs),

    /// Run the query rounds (resets the query file)
    Query(commands::query::QueryArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            init_tracing(args.common.verbose);
            commands::run::run(args).await
        }
        Commands::Provision(args) => {
            init_tracing(args.common.verbose);
            commands::provision::run(args).await
        }
        Commands::Insert(args) => {
            init_tracing(args.common.verbose);
            commands::insert::run(args).await
        }
        Commands::Query(args) => {
            init_tracing(args.common.verbose);
            commands::query::run(args).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
