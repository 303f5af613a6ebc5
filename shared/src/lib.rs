//! Shared types and utilities for sensorbench
//!
//! This crate contains the data model used across the benchmark harness and
//! the command-line front end: source readings, week buckets in both their
//! relational and point representations, and the metrics rows written to CSV.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{bucket::*, reading::*, record::*};
