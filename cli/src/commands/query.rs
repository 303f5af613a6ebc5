//! Query command implementation

use super::{finish, prepare, CommonArgs};
use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use sensorbench_harness::config::Overrides;

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Configured rounds; runs one fewer
    #[arg(short, long)]
    pub rounds: Option<u32>,
}

pub async fn run(args: QueryArgs) -> Result<()> {
    let orchestrator = prepare(
        &args.common,
        Overrides {
            rounds: args.rounds,
            ..Default::default()
        },
    )?;

    let report = orchestrator
        .query_all()
        .await
        .context("Failed to reset the query file")?;
    output::query_report(&report);

    finish(&orchestrator)
}
