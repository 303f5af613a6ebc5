//! Run orchestration
//!
//! Provision every backend, then insert into each in turn, then run the
//! query rounds (each round visits every backend). Backends are always
//! visited in lineup order and one operation is in flight at a time. A
//! failure is contained to its backend: the phase moves on to the next one.

use crate::config::BenchConfig;
use crate::dataset::DatasetReader;
use crate::insertion::{InsertionDriver, InsertionSummary};
use crate::metrics;
use crate::query::QueryDriver;
use crate::report;
use crate::sink::{MetricsSink, SinkError};
use crate::storage::Backend;
use tracing::{info, warn};

/// A backend that did not complete a phase, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub backend: String,
    pub cause: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProvisionReport {
    pub provisioned: Vec<String>,
    pub failed: Vec<Failure>,
}

#[derive(Debug, Clone, Default)]
pub struct InsertionReport {
    pub passes: Vec<(String, InsertionSummary)>,
    /// Backends whose pass could not start
    pub failed: Vec<Failure>,
    /// Unparseable dataset rows, per pass
    pub dataset_rows_skipped: u64,
}

/// A round that did not complete for one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortedRound {
    pub backend: String,
    pub round: u32,
    /// Failing query label, or `None` when no session could be opened
    pub query: Option<&'static str>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryReport {
    pub rounds: u32,
    pub records: usize,
    pub aborted: Vec<AbortedRound>,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub provision: ProvisionReport,
    pub insertion: InsertionReport,
    pub query: QueryReport,
}

pub struct Orchestrator {
    config: BenchConfig,
    backends: Vec<Box<dyn Backend>>,
    sink: MetricsSink,
}

impl Orchestrator {
    pub fn new(config: BenchConfig, backends: Vec<Box<dyn Backend>>) -> Self {
        let sink = MetricsSink::new(
            config.benchmark.insertion_output.clone(),
            config.benchmark.query_output.clone(),
        );
        Self {
            config,
            backends,
            sink,
        }
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn backends(&self) -> &[Box<dyn Backend>] {
        &self.backends
    }

    pub fn sink(&self) -> &MetricsSink {
        &self.sink
    }

    /// Reset the insertion file, then drop and recreate every backend.
    pub async fn provision_all(&self) -> Result<ProvisionReport, SinkError> {
        self.sink.init_insertion_file()?;

        let mut summary = ProvisionReport::default();
        for backend in &self.backends {
            let name = backend.name();
            info!("Provisioning {}", name);
            match backend.provision().await {
                Ok(()) => {
                    metrics::PROVISION_TOTAL
                        .with_label_values(&[name, metrics::status(true)])
                        .inc();
                    summary.provisioned.push(name.to_string());
                }
                Err(e) => {
                    metrics::PROVISION_TOTAL
                        .with_label_values(&[name, metrics::status(false)])
                        .inc();
                    report::provisioning_failed(name, &e);
                    summary.failed.push(Failure {
                        backend: name.to_string(),
                        cause: e.to_string(),
                    });
                }
            }
        }
        Ok(summary)
    }

    /// Load the dataset into each backend in turn, re-reading it per backend.
    pub async fn insert_all(&self) -> InsertionReport {
        let dataset = &self.config.benchmark.dataset;
        let mut driver = InsertionDriver::new(
            self.sink.clone(),
            self.config.benchmark.batch_size,
            self.config.insertion_round(),
        );

        let mut summary = InsertionReport::default();
        for backend in &self.backends {
            let name = backend.name();
            info!("Inserting into {}", name);

            let mut reader = match DatasetReader::open(dataset) {
                Ok(reader) => reader,
                Err(e) => {
                    report::dataset_unavailable(name, &e);
                    summary.failed.push(Failure {
                        backend: name.to_string(),
                        cause: e.to_string(),
                    });
                    continue;
                }
            };

            match driver.insert_all(backend.as_ref(), &mut reader).await {
                Ok(pass) => summary.passes.push((name.to_string(), pass)),
                Err(e) => summary.failed.push(Failure {
                    backend: name.to_string(),
                    cause: e.to_string(),
                }),
            }

            if reader.skipped() > 0 {
                warn!("{}: skipped {} unparseable dataset rows", name, reader.skipped());
            }
            summary.dataset_rows_skipped = summary.dataset_rows_skipped.max(reader.skipped());
        }
        summary
    }

    /// Reset the query file, then run every round against every backend.
    pub async fn query_all(&self) -> Result<QueryReport, SinkError> {
        self.sink.init_query_file()?;

        let rounds = self.config.query_rounds();
        let mut driver = QueryDriver::new(self.sink.clone());
        let mut summary = QueryReport::default();

        for round in rounds.clone() {
            info!("Query round {} of {}", round, rounds.end.saturating_sub(1));
            for backend in &self.backends {
                match driver.run_round(backend.as_ref(), round).await {
                    Ok(round_summary) => {
                        summary.records += round_summary.completed;
                        if let Some(query) = round_summary.failed_query {
                            summary.aborted.push(AbortedRound {
                                backend: backend.name().to_string(),
                                round,
                                query: Some(query),
                            });
                        }
                    }
                    Err(_) => summary.aborted.push(AbortedRound {
                        backend: backend.name().to_string(),
                        round,
                        query: None,
                    }),
                }
            }
            summary.rounds += 1;
        }
        Ok(summary)
    }

    /// Provision, insert, then query.
    pub async fn run(&self) -> Result<RunReport, SinkError> {
        let provision = self.provision_all().await?;
        let insertion = self.insert_all().await;
        let query = self.query_all().await?;
        Ok(RunReport {
            provision,
            insertion,
            query,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Overrides;
    use crate::storage::build_backends;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_dataset(path: &Path) {
        let mut text = String::from("event_timestamp,temperature,sensor_name\n");
        // Tuesday 2023-01-03 through Monday 2023-01-09: weeks 2023-1 and 2023-2.
        for day in 3..=9 {
            text.push_str(&format!("2023-01-{:02} 12:00:00,2{}.5,Sensor A\n", day, day));
        }
        text.push_str("garbage row\n");
        fs::write(path, text).unwrap();
    }

    fn dry_config(dir: &TempDir, rounds: u32) -> BenchConfig {
        let mut config = BenchConfig::default();
        config.benchmark.insertion_output = dir.path().join("out/insertion_times.csv");
        config.benchmark.query_output = dir.path().join("out/query_times.csv");
        config.apply(Overrides {
            dataset: Some(dir.path().join("data.csv")),
            rounds: Some(rounds),
            batch_size: Some(2),
            ..Default::default()
        });
        config
    }

    #[tokio::test]
    async fn test_dry_run_end_to_end() {
        let dir = TempDir::new().unwrap();
        write_dataset(&dir.path().join("data.csv"));
        let config = dry_config(&dir, 3);
        let backends = build_backends(&config, true).unwrap();
        let orchestrator = Orchestrator::new(config, backends);

        let report = orchestrator.run().await.unwrap();
        assert_eq!(report.provision.provisioned.len(), 5);
        assert!(report.provision.failed.is_empty());
        assert_eq!(report.insertion.passes.len(), 5);
        assert_eq!(report.insertion.dataset_rows_skipped, 1);
        assert!(report
            .insertion
            .passes
            .iter()
            .all(|(_, s)| s.buckets == 2 && s.rows == 7));
        // rounds = 3 runs rounds 1 and 2.
        assert_eq!(report.query.rounds, 2);
        assert_eq!(report.query.records, 2 * 5 * 7);

        let insertion = fs::read_to_string(orchestrator.sink().insertion_path()).unwrap();
        assert_eq!(insertion.lines().count(), 1 + 5 * 2);
        let query = fs::read_to_string(orchestrator.sink().query_path()).unwrap();
        assert_eq!(query.lines().count(), 1 + 2 * 5 * 7);
        assert!(query.lines().nth(1).unwrap().starts_with("mariadb_innodb,"));
    }

    #[tokio::test]
    async fn test_missing_dataset_is_contained() {
        let dir = TempDir::new().unwrap();
        let config = dry_config(&dir, 2);
        let backends = build_backends(&config, true).unwrap();
        let orchestrator = Orchestrator::new(config, backends);

        orchestrator.provision_all().await.unwrap();
        let report = orchestrator.insert_all().await;
        assert_eq!(report.failed.len(), 5);
        assert!(report.passes.is_empty());

        let insertion = fs::read_to_string(orchestrator.sink().insertion_path()).unwrap();
        assert_eq!(insertion.lines().count(), 1);
    }
}
