//! Week buckets
//!
//! A bucket is a contiguous run of readings sharing one ISO `(year, week)`
//! pair. Every bucket is materialised twice, once as relational rows for the
//! SQL backends and once as tagged points for the time-series backend, so a
//! single pass over the source feeds both kinds of backend.

use crate::types::reading::SensorReading;
use chrono::{Datelike, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Measurement name for every point written to the time-series backend.
pub const MEASUREMENT: &str = "sensor_data";

/// Field carrying the reading value.
pub const TEMPERATURE_FIELD: &str = "temperature";

/// ISO calendar week key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekKey {
    pub iso_year: i32,
    pub iso_week: u32,
}

impl WeekKey {
    pub fn new(iso_year: i32, iso_week: u32) -> Self {
        Self { iso_year, iso_week }
    }

    pub fn of(ts: &NaiveDateTime) -> Self {
        let week = ts.date().iso_week();
        Self::new(week.year(), week.week())
    }
}

/// `{iso_year}-{iso_week}`, the same text used for the `week` point tag.
impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.iso_year, self.iso_week)
    }
}

impl Serialize for WeekKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Relational form of a reading. `year_number` is only filled in for
/// backends whose schema partitions by year.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    pub event_timestamp: NaiveDateTime,
    pub temperature: f64,
    pub sensor_name: String,
    pub year_number: Option<i32>,
}

impl From<&SensorReading> for SqlRow {
    fn from(r: &SensorReading) -> Self {
        Self {
            event_timestamp: r.event_timestamp,
            temperature: r.temperature,
            sensor_name: r.sensor_name.clone(),
            year_number: None,
        }
    }
}

/// A point that cannot be written to the time-series backend.
#[derive(Debug, Error, PartialEq)]
pub enum MalformedPoint {
    #[error("point has no measurement")]
    MissingMeasurement,

    #[error("point at {0} has no fields")]
    MissingFields(NaiveDateTime),
}

/// Point form of a reading, tagged with its week.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
    pub time: NaiveDateTime,
}

impl TaggedPoint {
    /// Non-finite temperatures have no line-protocol representation, so they
    /// leave the point without fields and [`TaggedPoint::validate`] rejects it.
    pub fn from_reading(r: &SensorReading, week: WeekKey) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("sensor_name".to_string(), r.sensor_name.clone());
        tags.insert("week".to_string(), week.to_string());

        let mut fields = BTreeMap::new();
        if r.temperature.is_finite() {
            fields.insert(TEMPERATURE_FIELD.to_string(), r.temperature);
        }

        Self {
            measurement: MEASUREMENT.to_string(),
            tags,
            fields,
            time: r.event_timestamp,
        }
    }

    pub fn validate(&self) -> Result<(), MalformedPoint> {
        if self.measurement.is_empty() {
            return Err(MalformedPoint::MissingMeasurement);
        }
        if self.fields.is_empty() {
            return Err(MalformedPoint::MissingFields(self.time));
        }
        Ok(())
    }
}

/// All readings of one ISO week, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekBucket {
    pub key: WeekKey,
    pub rows: Vec<SqlRow>,
    pub points: Vec<TaggedPoint>,
}

impl WeekBucket {
    pub fn new(key: WeekKey) -> Self {
        Self {
            key,
            rows: Vec::new(),
            points: Vec::new(),
        }
    }

    /// Append a reading in both representations.
    pub fn push(&mut self, reading: &SensorReading) {
        debug_assert_eq!(reading.week_key(), self.key);
        self.rows.push(SqlRow::from(reading));
        self.points.push(TaggedPoint::from_reading(reading, self.key));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fill `year_number` on every row from its own timestamp.
    pub fn derive_year_numbers(&mut self) {
        for row in &mut self.rows {
            row.year_number = Some(row.event_timestamp.year());
        }
    }

    /// Split into consecutive sub-batches of at most `size` rows. The row and
    /// point slices of each sub-batch cover the same readings.
    pub fn sub_batches(&self, size: usize) -> impl Iterator<Item = SubBatch<'_>> {
        let size = size.max(1);
        self.rows
            .chunks(size)
            .zip(self.points.chunks(size))
            .enumerate()
            .map(move |(index, (rows, points))| SubBatch {
                key: self.key,
                index,
                rows,
                points,
            })
    }
}

/// One bulk-insert unit.
#[derive(Debug, Clone, Copy)]
pub struct SubBatch<'a> {
    pub key: WeekKey,
    pub index: usize,
    pub rows: &'a [SqlRow],
    pub points: &'a [TaggedPoint],
}

impl SubBatch<'_> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::parse_timestamp;

    fn reading(ts: &str, temp: f64, sensor: &str) -> SensorReading {
        SensorReading::new(parse_timestamp(ts).unwrap(), temp, sensor)
    }

    fn bucket_of(n: usize) -> WeekBucket {
        let mut bucket = WeekBucket::new(WeekKey::new(2023, 2));
        for i in 0..n {
            bucket.push(&reading(&format!("2023-01-09 00:00:0{}", i), i as f64, "Sensor A"));
        }
        bucket
    }

    #[test]
    fn test_week_key_uses_iso_calendar() {
        // 2023-01-01 is a Sunday and still belongs to the last ISO week of 2022.
        let sunday = parse_timestamp("2023-01-01 00:00:00").unwrap();
        assert_eq!(WeekKey::of(&sunday), WeekKey::new(2022, 52));

        let monday = parse_timestamp("2023-01-02 00:00:00").unwrap();
        assert_eq!(WeekKey::of(&monday), WeekKey::new(2023, 1));

        // 2024-12-30 is a Monday in ISO week 1 of 2025.
        let late = parse_timestamp("2024-12-30 10:00:00").unwrap();
        assert_eq!(WeekKey::of(&late), WeekKey::new(2025, 1));
    }

    #[test]
    fn test_week_key_display_matches_tag() {
        assert_eq!(WeekKey::new(2023, 7).to_string(), "2023-7");
    }

    #[test]
    fn test_push_builds_both_representations() {
        let bucket = bucket_of(2);
        assert_eq!(bucket.rows.len(), 2);
        assert_eq!(bucket.points.len(), 2);

        let point = &bucket.points[1];
        assert_eq!(point.measurement, MEASUREMENT);
        assert_eq!(point.tags["week"], "2023-2");
        assert_eq!(point.tags["sensor_name"], "Sensor A");
        assert_eq!(point.fields[TEMPERATURE_FIELD], 1.0);
        assert_eq!(point.time, bucket.rows[1].event_timestamp);
        assert!(bucket.rows.iter().all(|r| r.year_number.is_none()));
    }

    #[test]
    fn test_sub_batches_sizes() {
        let bucket = bucket_of(5);
        let sizes: Vec<usize> = bucket.sub_batches(2).map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        let rejoined: Vec<SqlRow> = bucket
            .sub_batches(2)
            .flat_map(|b| b.rows.iter().cloned())
            .collect();
        assert_eq!(rejoined, bucket.rows);
    }

    #[test]
    fn test_sub_batches_keep_rows_and_points_aligned() {
        let bucket = bucket_of(5);
        for batch in bucket.sub_batches(3) {
            assert_eq!(batch.rows.len(), batch.points.len());
            for (row, point) in batch.rows.iter().zip(batch.points) {
                assert_eq!(row.event_timestamp, point.time);
            }
        }
    }

    #[test]
    fn test_sub_batches_larger_than_bucket() {
        let bucket = bucket_of(3);
        let batches: Vec<_> = bucket.sub_batches(100_000).collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[0].index, 0);
    }

    #[test]
    fn test_derive_year_numbers_across_year_boundary() {
        let mut bucket = WeekBucket::new(WeekKey::new(2023, 52));
        bucket.push(&reading("2023-12-31 23:59:59", 1.0, "A"));
        let mut next = WeekBucket::new(WeekKey::new(2024, 1));
        next.push(&reading("2024-01-01 00:00:01", 1.0, "A"));

        bucket.derive_year_numbers();
        next.derive_year_numbers();
        assert_eq!(bucket.rows[0].year_number, Some(2023));
        assert_eq!(next.rows[0].year_number, Some(2024));
    }

    #[test]
    fn test_non_finite_temperature_is_malformed() {
        let r = reading("2023-01-09 00:00:00", f64::NAN, "A");
        let point = TaggedPoint::from_reading(&r, r.week_key());
        assert!(matches!(point.validate(), Err(MalformedPoint::MissingFields(_))));

        let ok = TaggedPoint::from_reading(&reading("2023-01-09 00:00:00", 3.5, "A"), WeekKey::new(2023, 2));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_missing_measurement_is_malformed() {
        let r = reading("2023-01-09 00:00:00", 1.0, "A");
        let mut point = TaggedPoint::from_reading(&r, r.week_key());
        point.measurement.clear();
        assert_eq!(point.validate(), Err(MalformedPoint::MissingMeasurement));
    }
}
