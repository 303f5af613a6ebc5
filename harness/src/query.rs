//! Query driver
//!
//! One round is one session running the whole battery in order. Each query
//! is timed on its own with statement construction kept outside the timed
//! region. A failing query abandons the rest of the round for that backend;
//! the session is closed either way.

use crate::error::BackendError;
use crate::measure::{measure, Measurement, ResourceProbe};
use crate::metrics;
use crate::queries::QueryShape;
use crate::report::{self, PHASE_QUERY};
use crate::sink::MetricsSink;
use crate::storage::{Backend, Session};
use sensorbench_shared::QueryRecord;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSummary {
    /// Queries that completed and were recorded
    pub completed: usize,
    /// Label of the query that aborted the round
    pub failed_query: Option<&'static str>,
    pub records_dropped: usize,
}

pub struct QueryDriver {
    sink: MetricsSink,
    resources: ResourceProbe,
}

impl QueryDriver {
    pub fn new(sink: MetricsSink) -> Self {
        Self {
            sink,
            resources: ResourceProbe::new(),
        }
    }

    /// Run the battery once against `backend`. Returns an error only when no
    /// session could be opened.
    pub async fn run_round(
        &mut self,
        backend: &dyn Backend,
        round: u32,
    ) -> Result<RoundSummary, BackendError> {
        let name = backend.name();
        let mut session = backend.open_session().await.map_err(|e| {
            report::round_unavailable(name, round, &e);
            e
        })?;

        let summary = self.run_battery(backend, session.as_mut(), round).await;

        if let Err(e) = session.close().await {
            report::session_close_failed(name, PHASE_QUERY, &e);
        }
        Ok(summary)
    }

    async fn run_battery(
        &mut self,
        backend: &dyn Backend,
        session: &mut dyn Session,
        round: u32,
    ) -> RoundSummary {
        let name = backend.name();
        let mut summary = RoundSummary::default();

        for shape in QueryShape::ALL {
            let label = shape.label();
            let statement = backend.statement(shape);

            let Measurement {
                output,
                elapsed,
                resources,
            } = measure(&mut self.resources, session.execute_query(&statement)).await;

            let rows = match output {
                Ok(rows) => rows,
                Err(e) => {
                    metrics::QUERIES_TOTAL
                        .with_label_values(&[name, label, metrics::status(false)])
                        .inc();
                    report::query_failed(name, round, label, &e);
                    summary.failed_query = Some(label);
                    break;
                }
            };

            let seconds = elapsed.as_secs_f64();
            metrics::QUERIES_TOTAL
                .with_label_values(&[name, label, metrics::status(true)])
                .inc();
            metrics::QUERY_DURATION
                .with_label_values(&[name, label])
                .observe(seconds);
            debug!("{} round {} {}: {} rows in {:.3}s", name, round, label, rows, seconds);

            summary.completed += 1;
            let record = QueryRecord {
                table_name: name.to_string(),
                query_time: seconds,
                query_type: label.to_string(),
                round_number: round,
                ram_usage: resources.ram_used_gb,
                swap_usage: resources.swap_used_gb,
            };
            if let Err(e) = self.sink.append_query(&record) {
                report::record_dropped(name, PHASE_QUERY, &e);
                summary.records_dropped += 1;
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBackend;
    use crate::storage::{BackendDescriptor, Endpoint, LINEUP};
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_writes_seven_records_in_order() {
        let dir = TempDir::new().unwrap();
        let sink = MetricsSink::new(dir.path().join("insertion.csv"), dir.path().join("query.csv"));
        sink.init_query_file().unwrap();

        let backend = MemoryBackend::new(BackendDescriptor::new(&LINEUP[4], Endpoint::InMemory, "b"));
        backend.provision().await.unwrap();

        let mut driver = QueryDriver::new(sink.clone());
        let summary = driver.run_round(&backend, 3).await.unwrap();
        assert_eq!(summary.completed, 7);
        assert_eq!(summary.failed_query, None);

        let text = fs::read_to_string(sink.query_path()).unwrap();
        let labels: Vec<_> = text
            .lines()
            .skip(1)
            .map(|line| line.split(',').nth(2).unwrap().to_string())
            .collect();
        let expected: Vec<_> = QueryShape::ALL.iter().map(|q| q.label().to_string()).collect();
        assert_eq!(labels, expected);
        assert!(text.lines().skip(1).all(|l| l.starts_with("influxdb,") && l.contains(",3,")));
    }

    #[tokio::test]
    async fn test_failure_aborts_round_without_records() {
        let dir = TempDir::new().unwrap();
        let sink = MetricsSink::new(dir.path().join("insertion.csv"), dir.path().join("query.csv"));
        sink.init_query_file().unwrap();

        // Never provisioned: the first query fails.
        let backend = MemoryBackend::new(BackendDescriptor::new(&LINEUP[0], Endpoint::InMemory, "b"));
        let mut driver = QueryDriver::new(sink.clone());
        let summary = driver.run_round(&backend, 1).await.unwrap();
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.failed_query, Some("1_year_a"));

        let text = fs::read_to_string(sink.query_path()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
