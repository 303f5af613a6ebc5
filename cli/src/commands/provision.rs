//! Provision command implementation

use super::{finish, prepare, CommonArgs};
use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use sensorbench_harness::config::Overrides;

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn run(args: ProvisionArgs) -> Result<()> {
    let orchestrator = prepare(&args.common, Overrides::default())?;

    let report = orchestrator
        .provision_all()
        .await
        .context("Failed to reset the insertion file")?;
    output::provision_report(&report);

    finish(&orchestrator)
}
