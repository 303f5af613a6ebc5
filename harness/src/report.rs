//! Failure reporting
//!
//! Every contained failure is emitted via `tracing` on a dedicated target so
//! a run can be audited afterwards even though its CSV output is sparse.
//! Each event carries the backend, the phase and the cause, plus the week,
//! round or query it belongs to where one applies.

use crate::error::BackendError;
use crate::metrics;
use crate::sink::SinkError;
use sensorbench_shared::{MalformedPoint, WeekKey};
use tracing::{error, warn};

pub const FAILURE_TARGET: &str = "sensorbench::failures";

pub const PHASE_PROVISION: &str = "provision";
pub const PHASE_INSERT: &str = "insert";
pub const PHASE_QUERY: &str = "query";

/// Schema or bucket reset failed; the backend is skipped for provisioning.
pub fn provisioning_failed(backend: &str, cause: &BackendError) {
    error!(
        target: FAILURE_TARGET,
        event = "provisioning_failed",
        backend = %backend,
        phase = PHASE_PROVISION,
        cause = %cause,
    );
}

/// A bucket insert failed; no record is written for it and the pass
/// continues with the next week.
pub fn bucket_failed(backend: &str, week: WeekKey, cause: &BackendError) {
    error!(
        target: FAILURE_TARGET,
        event = "bucket_failed",
        backend = %backend,
        phase = PHASE_INSERT,
        week = %week,
        cause = %cause,
    );
}

/// The insertion session could not be opened.
pub fn insertion_unavailable(backend: &str, cause: &BackendError) {
    error!(
        target: FAILURE_TARGET,
        event = "insertion_unavailable",
        backend = %backend,
        phase = PHASE_INSERT,
        cause = %cause,
    );
}

/// The dataset could not be opened for this backend's pass.
pub fn dataset_unavailable(backend: &str, cause: &dyn std::error::Error) {
    error!(
        target: FAILURE_TARGET,
        event = "dataset_unavailable",
        backend = %backend,
        phase = PHASE_INSERT,
        cause = %cause,
    );
}

/// A point was rejected before being sent.
pub fn point_skipped(backend: &str, week: WeekKey, cause: &MalformedPoint) {
    metrics::POINTS_SKIPPED.with_label_values(&[backend]).inc();
    warn!(
        target: FAILURE_TARGET,
        event = "point_skipped",
        backend = %backend,
        phase = PHASE_INSERT,
        week = %week,
        cause = %cause,
    );
}

/// A query failed; the remainder of the round is abandoned for this backend.
pub fn query_failed(backend: &str, round: u32, query: &str, cause: &BackendError) {
    error!(
        target: FAILURE_TARGET,
        event = "query_failed",
        backend = %backend,
        phase = PHASE_QUERY,
        round = round,
        query = %query,
        cause = %cause,
    );
}

/// The query session for a round could not be opened.
pub fn round_unavailable(backend: &str, round: u32, cause: &BackendError) {
    error!(
        target: FAILURE_TARGET,
        event = "round_unavailable",
        backend = %backend,
        phase = PHASE_QUERY,
        round = round,
        cause = %cause,
    );
}

pub fn session_close_failed(backend: &str, phase: &str, cause: &BackendError) {
    warn!(
        target: FAILURE_TARGET,
        event = "session_close_failed",
        backend = %backend,
        phase = %phase,
        cause = %cause,
    );
}

/// A measured event could not be appended to its CSV file.
pub fn record_dropped(backend: &str, phase: &str, cause: &SinkError) {
    metrics::RECORDS_DROPPED.with_label_values(&[phase]).inc();
    error!(
        target: FAILURE_TARGET,
        event = "record_dropped",
        backend = %backend,
        phase = %phase,
        cause = %cause,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_target_is_static() {
        assert_eq!(FAILURE_TARGET, "sensorbench::failures");
    }

    #[test]
    fn point_skipped_is_counted() {
        let before = metrics::POINTS_SKIPPED.with_label_values(&["report_test"]).get();
        point_skipped(
            "report_test",
            WeekKey::new(2023, 1),
            &MalformedPoint::MissingMeasurement,
        );
        let after = metrics::POINTS_SKIPPED.with_label_values(&["report_test"]).get();
        assert_eq!(after - before, 1.0);
    }
}
