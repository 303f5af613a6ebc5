//! Run command implementation

use super::{finish, prepare, CommonArgs};
use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use sensorbench_harness::config::Overrides;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Source CSV (overrides [benchmark] dataset)
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Rows per bulk insert
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Configured rounds; the query phase runs one fewer
    #[arg(short, long)]
    pub rounds: Option<u32>,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let orchestrator = prepare(
        &args.common,
        Overrides {
            dataset: args.dataset,
            batch_size: args.batch_size,
            rounds: args.rounds,
            ..Default::default()
        },
    )?;

    output::info("Provisioning");
    let provision = orchestrator
        .provision_all()
        .await
        .context("Failed to reset the insertion file")?;
    output::provision_report(&provision);

    output::info("Inserting");
    let insertion = orchestrator.insert_all().await;
    output::insertion_report(&insertion);

    output::info("Querying");
    let query = orchestrator
        .query_all()
        .await
        .context("Failed to reset the query file")?;
    output::query_report(&query);

    finish(&orchestrator)
}
