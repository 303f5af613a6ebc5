//! Run counters
//!
//! Registered on the default Prometheus registry and dumped as text at the
//! end of a run. There is no scrape endpoint.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

// ── Provisioning ─────────────────────────────────────────────────────────────

pub static PROVISION_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sensorbench_provision_total",
        "Provisioning attempts",
        &["backend", "status"]
    )
    .expect("static metric definition")
});

// ── Insertion ────────────────────────────────────────────────────────────────

pub static BUCKETS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sensorbench_buckets_total",
        "Week bucket insert attempts",
        &["backend", "status"]
    )
    .expect("static metric definition")
});

pub static ROWS_INSERTED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sensorbench_rows_inserted_total",
        "Rows or points accepted by a backend",
        &["backend"]
    )
    .expect("static metric definition")
});

pub static POINTS_SKIPPED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sensorbench_points_skipped_total",
        "Malformed points dropped before writing",
        &["backend"]
    )
    .expect("static metric definition")
});

// ── Queries ──────────────────────────────────────────────────────────────────

pub static QUERIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sensorbench_queries_total",
        "Query executions",
        &["backend", "query", "status"]
    )
    .expect("static metric definition")
});

pub static QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "sensorbench_query_duration_seconds",
        "Query latency",
        &["backend", "query"],
        vec![0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("static metric definition")
});

// ── Output ───────────────────────────────────────────────────────────────────

pub static RECORDS_DROPPED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sensorbench_records_dropped_total",
        "Metrics rows that could not be written",
        &["phase"]
    )
    .expect("static metric definition")
});

pub fn status(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_touched_counters() {
        BUCKETS_TOTAL.with_label_values(&["metrics_test", "ok"]).inc();
        QUERY_DURATION
            .with_label_values(&["metrics_test", "1_year_a"])
            .observe(0.2);
        let text = encode_metrics().unwrap();
        assert!(text.contains("sensorbench_buckets_total"));
        assert!(text.contains("sensorbench_query_duration_seconds_bucket"));
    }
}
