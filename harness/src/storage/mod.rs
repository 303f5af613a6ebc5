//! Storage backends
//!
//! One capability interface over every engine under test. The drivers only
//! ever see [`Backend`] and [`Session`]; engine differences (schema,
//! insertion representation, query dialect, footprint probe) live in the
//! variants.

pub mod influxdb;
pub mod mariadb;
pub mod memory;

use crate::config::BenchConfig;
use crate::error::BackendError;
use crate::probe::StorageProbe;
use crate::queries::{Dialect, QueryShape};
use async_trait::async_trait;
use sensorbench_shared::SubBatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    RowStore,
    ColumnStore,
    Lsm,
    TimeSeries,
}

impl EngineKind {
    /// `ENGINE=` clause value for SQL backends.
    pub fn sql_engine(&self) -> Option<&'static str> {
        match self {
            Self::RowStore => Some("InnoDB"),
            Self::ColumnStore => Some("ColumnStore"),
            Self::Lsm => Some("ROCKSDB"),
            Self::TimeSeries => None,
        }
    }
}

/// Representation a backend is loaded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionStrategy {
    /// `(event_timestamp, temperature, sensor_name)` rows
    Plain,
    /// Plain rows plus `year_number`, for year-partitioned schemas
    DerivedYear,
    /// Tagged points
    Points,
}

impl InsertionStrategy {
    pub fn dialect(&self, bucket: &str) -> Dialect {
        match self {
            Self::Plain => Dialect::Sql,
            Self::DerivedYear => Dialect::PartitionedSql,
            Self::Points => Dialect::Flux {
                bucket: bucket.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Sql { host: String, port: u16 },
    Http { url: String },
    InMemory,
}

/// One row of the fixed lineup.
#[derive(Debug, Clone, Copy)]
pub struct LineupEntry {
    pub name: &'static str,
    pub engine: EngineKind,
    pub strategy: InsertionStrategy,
}

/// Every backend under test, in the order each phase visits them.
pub const LINEUP: [LineupEntry; 5] = [
    LineupEntry {
        name: "mariadb_innodb",
        engine: EngineKind::RowStore,
        strategy: InsertionStrategy::Plain,
    },
    LineupEntry {
        name: "mariadb_innodb_optimized",
        engine: EngineKind::RowStore,
        strategy: InsertionStrategy::DerivedYear,
    },
    LineupEntry {
        name: "mariadb_myrocks",
        engine: EngineKind::Lsm,
        strategy: InsertionStrategy::DerivedYear,
    },
    LineupEntry {
        name: "mariadb_columnstore",
        engine: EngineKind::ColumnStore,
        strategy: InsertionStrategy::Plain,
    },
    LineupEntry {
        name: "influxdb",
        engine: EngineKind::TimeSeries,
        strategy: InsertionStrategy::Points,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    /// Identity in logs and in the `table_name` column
    pub name: String,
    pub engine: EngineKind,
    pub strategy: InsertionStrategy,
    pub endpoint: Endpoint,
    pub dialect: Dialect,
}

impl BackendDescriptor {
    pub fn new(entry: &LineupEntry, endpoint: Endpoint, bucket: &str) -> Self {
        Self {
            name: entry.name.to_string(),
            engine: entry.engine,
            strategy: entry.strategy,
            endpoint,
            dialect: entry.strategy.dialect(bucket),
        }
    }
}

/// Outcome of one bulk insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Rows or points accepted by the backend
    pub written: usize,
    /// Points rejected as malformed before sending
    pub skipped: usize,
}

/// A backend under test.
#[async_trait]
pub trait Backend: Send + Sync {
    fn descriptor(&self) -> &BackendDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Query text for `shape` in this backend's dialect.
    fn statement(&self, shape: QueryShape) -> String {
        self.descriptor().dialect.statement(shape)
    }

    /// Drop and recreate the schema (or bucket). Leaves the backend empty.
    async fn provision(&self) -> Result<(), BackendError>;

    async fn open_session(&self) -> Result<Box<dyn Session>, BackendError>;

    /// Human-readable on-disk footprint, or a diagnostic string.
    async fn storage_size(&self) -> String;
}

/// An open connection to a backend. Callers must `close` it on every path.
#[async_trait]
pub trait Session: Send {
    /// Write one sub-batch in the backend's representation.
    async fn bulk_insert(&mut self, batch: SubBatch<'_>) -> Result<InsertOutcome, BackendError>;

    /// Run `statement`, draining the result. Returns the row count.
    async fn execute_query(&mut self, statement: &str) -> Result<usize, BackendError>;

    async fn close(&mut self) -> Result<(), BackendError>;
}

/// Build the selected lineup. A dry run swaps every engine for an in-memory
/// store under the same name.
pub fn build_backends(config: &BenchConfig, dry_run: bool) -> anyhow::Result<Vec<Box<dyn Backend>>> {
    let selected = config.selected_backends();
    let mut backends: Vec<Box<dyn Backend>> = Vec::with_capacity(selected.len());

    for entry in LINEUP.iter().filter(|e| selected.contains(&e.name)) {
        if dry_run {
            let descriptor = BackendDescriptor::new(entry, Endpoint::InMemory, &config.influxdb.bucket);
            backends.push(Box::new(memory::MemoryBackend::new(descriptor)));
            continue;
        }

        match entry.strategy {
            InsertionStrategy::Points => {
                let influx = &config.influxdb;
                let descriptor = BackendDescriptor::new(
                    entry,
                    Endpoint::Http {
                        url: influx.url.clone(),
                    },
                    &influx.bucket,
                );
                let probe = StorageProbe::Volume {
                    volume: influx.volume.clone(),
                };
                backends.push(Box::new(influxdb::InfluxBackend::new(descriptor, influx, probe)?));
            }
            InsertionStrategy::Plain | InsertionStrategy::DerivedYear => {
                let endpoint = config.sql_endpoint(entry.name)?;
                let descriptor = BackendDescriptor::new(
                    entry,
                    Endpoint::Sql {
                        host: endpoint.host,
                        port: endpoint.port,
                    },
                    &config.influxdb.bucket,
                );
                let probe = StorageProbe::ContainerMounts {
                    container: entry.name.to_string(),
                    sudo: config.benchmark.probe_sudo,
                };
                backends.push(Box::new(mariadb::MariaDbBackend::new(
                    descriptor,
                    &config.database,
                    probe,
                )?));
            }
        }
    }

    Ok(backends)
}
