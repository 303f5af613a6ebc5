//! Subcommands and the setup they share

pub mod insert;
pub mod provision;
pub mod query;
pub mod run;

use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use sensorbench_harness::config::{BenchConfig, Overrides};
use sensorbench_harness::metrics::encode_metrics;
use sensorbench_harness::orchestrator::Orchestrator;
use sensorbench_harness::storage::build_backends;
use std::fs;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Configuration file
    #[arg(short, long, env = "SENSORBENCH_CONFIG", default_value = "config.ini")]
    pub config: PathBuf,

    /// Replace every backend with an in-memory store
    #[arg(long)]
    pub dry_run: bool,

    /// Only run these backends (repeatable)
    #[arg(short, long = "backend")]
    pub backends: Vec<String>,

    /// Write run counters in Prometheus text format to this file
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Load and validate the configuration, then build the lineup.
pub fn prepare(common: &CommonArgs, mut overrides: Overrides) -> Result<Orchestrator> {
    if !common.dry_run && !common.config.exists() {
        anyhow::bail!("Config file not found: {}", common.config.display());
    }

    let mut config = BenchConfig::load(&common.config)
        .with_context(|| format!("Failed to load {}", common.config.display()))?;
    overrides.backends = common.backends.clone();
    overrides.metrics_output = common.metrics_out.clone();
    config.apply(overrides);

    if common.dry_run {
        config.validate().context("Invalid configuration")?;
        output::warning("Dry run: every backend is an in-memory store");
    } else {
        config.validate_live().context("Invalid configuration")?;
    }

    let backends = build_backends(&config, common.dry_run).context("Failed to build backends")?;
    Ok(Orchestrator::new(config, backends))
}

/// Dump the run counters if an output file was configured.
pub fn finish(orchestrator: &Orchestrator) -> Result<()> {
    let Some(path) = orchestrator.config().benchmark.metrics_output.as_ref() else {
        return Ok(());
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let text = encode_metrics().context("Failed to encode metrics")?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    output::info(&format!("Run counters written to {}", path.display()));
    Ok(())
}
