//! Benchmark harness library
//!
//! Loads the sensor dataset into every configured backend week by week, runs
//! the fixed query battery for a number of rounds, and records timing, host
//! memory pressure and on-disk footprint for each unit of work.

/// Rows per bulk-insert call.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Configured round count. The query phase runs `DEFAULT_ROUNDS - 1` rounds
/// (see [`config::BenchConfig::query_rounds`]).
pub const DEFAULT_ROUNDS: u32 = 50;

pub mod batcher;
pub mod config;
pub mod dataset;
pub mod error;
pub mod insertion;
pub mod measure;
pub mod metrics;
pub mod orchestrator;
pub mod probe;
pub mod queries;
pub mod query;
pub mod report;
pub mod sink;
pub mod storage;
