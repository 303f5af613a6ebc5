//! In-memory backend for dry runs
//!
//! Keeps the rows it is given so that batching, measurement and the CSV
//! sinks can be exercised end to end without any database running.

use super::{Backend, BackendDescriptor, InsertOutcome, InsertionStrategy, Session};
use crate::error::BackendError;
use crate::report;
use async_trait::async_trait;
use sensorbench_shared::utils::format_size;
use sensorbench_shared::{SqlRow, SubBatch};
use std::sync::{Arc, Mutex};

/// Rough per-row footprint used for the reported storage size.
const ROW_BYTES: u64 = 32;

#[derive(Debug, Default)]
struct Table {
    provisioned: bool,
    rows: Vec<SqlRow>,
}

pub struct MemoryBackend {
    descriptor: BackendDescriptor,
    table: Arc<Mutex<Table>>,
}

impl MemoryBackend {
    pub fn new(descriptor: BackendDescriptor) -> Self {
        Self {
            descriptor,
            table: Arc::new(Mutex::new(Table::default())),
        }
    }

    pub fn row_count(&self) -> usize {
        self.table.lock().map(|t| t.rows.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> BackendError {
    BackendError::Execution("in-memory table lock poisoned".to_string())
}

#[async_trait]
impl Backend for MemoryBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn provision(&self) -> Result<(), BackendError> {
        let mut table = self.table.lock().map_err(poisoned)?;
        table.rows.clear();
        table.provisioned = true;
        Ok(())
    }

    async fn open_session(&self) -> Result<Box<dyn Session>, BackendError> {
        Ok(Box::new(MemorySession {
            backend: self.descriptor.name.clone(),
            points: self.descriptor.strategy == InsertionStrategy::Points,
            table: Some(Arc::clone(&self.table)),
        }))
    }

    async fn storage_size(&self) -> String {
        format_size(self.row_count() as u64 * ROW_BYTES)
    }
}

pub struct MemorySession {
    backend: String,
    points: bool,
    table: Option<Arc<Mutex<Table>>>,
}

impl MemorySession {
    fn table(&self) -> Result<&Arc<Mutex<Table>>, BackendError> {
        self.table
            .as_ref()
            .ok_or_else(|| BackendError::Connection("session already closed".to_string()))
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn bulk_insert(&mut self, batch: SubBatch<'_>) -> Result<InsertOutcome, BackendError> {
        let mut outcome = InsertOutcome::default();
        let mut accepted = Vec::with_capacity(batch.len());

        for (row, point) in batch.rows.iter().zip(batch.points) {
            if self.points {
                if let Err(e) = point.validate() {
                    report::point_skipped(&self.backend, batch.key, &e);
                    outcome.skipped += 1;
                    continue;
                }
            }
            accepted.push(row.clone());
        }

        let mut table = self.table()?.lock().map_err(poisoned)?;
        if !table.provisioned {
            return Err(BackendError::Execution(format!(
                "{} has not been provisioned",
                self.backend
            )));
        }
        outcome.written = accepted.len();
        table.rows.extend(accepted);
        Ok(outcome)
    }

    /// Statements are not interpreted; every query scans the whole table.
    async fn execute_query(&mut self, _statement: &str) -> Result<usize, BackendError> {
        let table = self.table()?.lock().map_err(poisoned)?;
        if !table.provisioned {
            return Err(BackendError::Execution(format!(
                "{} has not been provisioned",
                self.backend
            )));
        }
        Ok(table.rows.len())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.table = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Endpoint, LINEUP};
    use sensorbench_shared::utils::time::parse_timestamp;
    use sensorbench_shared::{SensorReading, WeekBucket, WeekKey};

    fn backend(index: usize) -> MemoryBackend {
        MemoryBackend::new(BackendDescriptor::new(&LINEUP[index], Endpoint::InMemory, "bench"))
    }

    fn bucket(temps: &[f64]) -> WeekBucket {
        let ts = parse_timestamp("2023-01-02 00:00:00").unwrap();
        let mut bucket = WeekBucket::new(WeekKey::new(2023, 1));
        for t in temps {
            bucket.push(&SensorReading::new(ts, *t, "Sensor A"));
        }
        bucket
    }

    #[tokio::test]
    async fn test_insert_then_query() {
        let backend = backend(0);
        backend.provision().await.unwrap();

        let data = bucket(&[1.0, 2.0, 3.0]);
        let mut session = backend.open_session().await.unwrap();
        for batch in data.sub_batches(2) {
            session.bulk_insert(batch).await.unwrap();
        }
        assert_eq!(session.execute_query("SELECT 1").await.unwrap(), 3);
        session.close().await.unwrap();

        assert_eq!(backend.row_count(), 3);
        assert_eq!(backend.storage_size().await, "96.00 B");
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let backend = backend(1);
        backend.provision().await.unwrap();
        let mut session = backend.open_session().await.unwrap();
        for batch in bucket(&[1.0, 2.0]).sub_batches(10) {
            session.bulk_insert(batch).await.unwrap();
        }
        session.close().await.unwrap();

        backend.provision().await.unwrap();
        backend.provision().await.unwrap();
        assert_eq!(backend.row_count(), 0);
    }

    #[tokio::test]
    async fn test_points_backend_skips_malformed() {
        let backend = backend(4);
        backend.provision().await.unwrap();
        let data = bucket(&[1.0, f64::NAN, 3.0]);
        let mut session = backend.open_session().await.unwrap();
        let outcome = session.bulk_insert(data.sub_batches(10).next().unwrap()).await.unwrap();
        assert_eq!(outcome, InsertOutcome { written: 2, skipped: 1 });
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_session_rejects_work() {
        let backend = backend(0);
        backend.provision().await.unwrap();
        let mut session = backend.open_session().await.unwrap();
        session.close().await.unwrap();
        let err = session.execute_query("SELECT 1").await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_unprovisioned_insert_fails() {
        let backend = backend(0);
        let mut session = backend.open_session().await.unwrap();
        let data = bucket(&[1.0]);
        let result = session.bulk_insert(data.sub_batches(10).next().unwrap()).await;
        assert!(matches!(result, Err(BackendError::Execution(_))));
    }
}
