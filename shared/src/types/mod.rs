//! Data model for the benchmark run

pub mod bucket;
pub mod reading;
pub mod record;
