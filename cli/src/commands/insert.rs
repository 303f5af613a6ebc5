//! Insert command implementation

use super::{finish, prepare, CommonArgs};
use crate::output;
use anyhow::Result;
use clap::Args;
use sensorbench_harness::config::Overrides;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InsertArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Source CSV (overrides [benchmark] dataset)
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Rows per bulk insert
    #[arg(long)]
    pub batch_size: Option<usize>,
}

/// Appends to the existing insertion file; `provision` is what resets it.
pub async fn run(args: InsertArgs) -> Result<()> {
    let orchestrator = prepare(
        &args.common,
        Overrides {
            dataset: args.dataset,
            batch_size: args.batch_size,
            ..Default::default()
        },
    )?;

    let report = orchestrator.insert_all().await;
    output::insertion_report(&report);

    finish(&orchestrator)
}
