//! Insertion driver
//!
//! Loads one backend week by week over a single session. Each bucket is one
//! measured unit: every sub-batch insert sits inside the timed region, the
//! memory sample follows immediately, then the storage probe, then exactly
//! one insertion record. A failed bucket produces no record and the pass
//! moves on to the next week on the same session.

use crate::batcher::WeekBatcher;
use crate::error::BackendError;
use crate::measure::{measure, Measurement, ResourceProbe};
use crate::metrics;
use crate::report::{self, PHASE_INSERT};
use crate::sink::MetricsSink;
use crate::storage::{Backend, InsertOutcome, InsertionStrategy, Session};
use sensorbench_shared::{InsertionRecord, SensorReading, WeekBucket, WeekKey};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertionSummary {
    /// Buckets inserted and recorded
    pub buckets: usize,
    /// Rows or points accepted by the backend
    pub rows: usize,
    /// Malformed points dropped before writing
    pub skipped_points: usize,
    /// Records that could not be appended to the CSV file
    pub records_dropped: usize,
    /// Weeks whose insert failed, in input order
    pub failed_weeks: Vec<WeekKey>,
}

pub struct InsertionDriver {
    sink: MetricsSink,
    resources: ResourceProbe,
    sub_batch_size: usize,
    round_number: u32,
}

impl InsertionDriver {
    pub fn new(sink: MetricsSink, sub_batch_size: usize, round_number: u32) -> Self {
        Self {
            sink,
            resources: ResourceProbe::new(),
            sub_batch_size,
            round_number,
        }
    }

    /// Insert every reading into `backend`. Returns an error only when no
    /// session could be opened; bucket failures are reported, collected in
    /// `failed_weeks` and skipped.
    pub async fn insert_all<I>(
        &mut self,
        backend: &dyn Backend,
        readings: I,
    ) -> Result<InsertionSummary, BackendError>
    where
        I: IntoIterator<Item = SensorReading>,
    {
        let name = backend.name();
        let mut session = backend.open_session().await.map_err(|e| {
            report::insertion_unavailable(name, &e);
            e
        })?;

        let summary = self.insert_buckets(backend, session.as_mut(), readings).await;

        if let Err(e) = session.close().await {
            report::session_close_failed(name, PHASE_INSERT, &e);
        }

        info!(
            "{}: {} buckets, {} rows inserted, {} weeks failed",
            name,
            summary.buckets,
            summary.rows,
            summary.failed_weeks.len()
        );
        Ok(summary)
    }

    async fn insert_buckets<I>(
        &mut self,
        backend: &dyn Backend,
        session: &mut dyn Session,
        readings: I,
    ) -> InsertionSummary
    where
        I: IntoIterator<Item = SensorReading>,
    {
        let name = backend.name();
        let derive_year = backend.descriptor().strategy == InsertionStrategy::DerivedYear;
        let sub_batch_size = self.sub_batch_size;
        let mut summary = InsertionSummary::default();

        for mut bucket in WeekBatcher::new(readings) {
            if derive_year {
                bucket.derive_year_numbers();
            }

            let Measurement {
                output,
                elapsed,
                resources,
            } = measure(
                &mut self.resources,
                insert_bucket(session, &bucket, sub_batch_size),
            )
            .await;

            let outcome = match output {
                Ok(outcome) => outcome,
                Err(e) => {
                    metrics::BUCKETS_TOTAL
                        .with_label_values(&[name, metrics::status(false)])
                        .inc();
                    report::bucket_failed(name, bucket.key, &e);
                    summary.failed_weeks.push(bucket.key);
                    continue;
                }
            };

            metrics::BUCKETS_TOTAL
                .with_label_values(&[name, metrics::status(true)])
                .inc();
            metrics::ROWS_INSERTED
                .with_label_values(&[name])
                .inc_by(outcome.written as f64);
            summary.buckets += 1;
            summary.rows += outcome.written;
            summary.skipped_points += outcome.skipped;

            let storage = backend.storage_size().await;
            debug!(
                "{} week {}: {} rows in {:.3}s, storage {}",
                name,
                bucket.key,
                outcome.written,
                elapsed.as_secs_f64(),
                storage
            );

            let record = InsertionRecord {
                table_name: name.to_string(),
                insertion_time: elapsed.as_secs_f64(),
                current_week: bucket.key,
                round_number: self.round_number,
                ram_usage: resources.ram_used_gb,
                swap_usage: resources.swap_used_gb,
                storage,
            };
            if let Err(e) = self.sink.append_insertion(&record) {
                report::record_dropped(name, PHASE_INSERT, &e);
                summary.records_dropped += 1;
            }
        }

        summary
    }
}

/// Every sub-batch of `bucket`, in order. Stops at the first failure.
async fn insert_bucket(
    session: &mut dyn Session,
    bucket: &WeekBucket,
    sub_batch_size: usize,
) -> Result<InsertOutcome, BackendError> {
    let mut total = InsertOutcome::default();
    for batch in bucket.sub_batches(sub_batch_size) {
        let outcome = session.bulk_insert(batch).await?;
        total.written += outcome.written;
        total.skipped += outcome.skipped;
    }
    Ok(total)
}
