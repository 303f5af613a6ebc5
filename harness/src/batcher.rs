//! Week batcher
//!
//! Turns an ordered reading stream into a lazy sequence of [`WeekBucket`]s.
//! A boundary is any change of ISO `(year, week)` between consecutive
//! readings; the accumulated bucket is emitted at that point and the final
//! bucket is emitted when the input runs out. Readings are never split
//! across buckets, dropped or reordered.

use sensorbench_shared::{SensorReading, WeekBucket};
use tracing::warn;

pub struct WeekBatcher<I> {
    readings: I,
    pending: Option<WeekBucket>,
}

impl<I> WeekBatcher<I>
where
    I: Iterator<Item = SensorReading>,
{
    pub fn new(readings: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            readings: readings.into_iter(),
            pending: None,
        }
    }
}

impl<I> Iterator for WeekBatcher<I>
where
    I: Iterator<Item = SensorReading>,
{
    type Item = WeekBucket;

    fn next(&mut self) -> Option<WeekBucket> {
        for reading in self.readings.by_ref() {
            let key = reading.week_key();
            match self.pending.as_mut() {
                Some(bucket) if bucket.key == key => bucket.push(&reading),
                _ => {
                    let mut fresh = WeekBucket::new(key);
                    fresh.push(&reading);
                    if let Some(done) = self.pending.replace(fresh) {
                        if key < done.key {
                            warn!(
                                "Input not sorted: week {} follows week {}; emitting as a new bucket",
                                key, done.key
                            );
                        }
                        return Some(done);
                    }
                }
            }
        }
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sensorbench_shared::utils::time::parse_timestamp;
    use sensorbench_shared::WeekKey;

    fn reading(ts: &str, temp: f64, sensor: &str) -> SensorReading {
        SensorReading::new(parse_timestamp(ts).unwrap(), temp, sensor)
    }

    /// Hourly readings alternating between two sensors.
    fn hourly(start: &str, hours: i64) -> Vec<SensorReading> {
        let start = parse_timestamp(start).unwrap();
        (0..hours)
            .map(|h| {
                let sensor = if h % 2 == 0 { "Sensor A" } else { "Sensor B" };
                SensorReading::new(start + Duration::hours(h), h as f64 / 10.0, sensor)
            })
            .collect()
    }

    #[test]
    fn test_two_weeks_two_buckets() {
        let input = vec![
            reading("2023-01-03 00:00:00", 20.0, "A"),
            reading("2023-01-04 12:00:00", 21.5, "A"),
            reading("2023-01-09 08:00:00", 19.0, "B"),
        ];
        let buckets: Vec<_> = WeekBatcher::new(input).collect();

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].key, WeekKey::new(2023, 1));
        assert_eq!(buckets[0].len(), 2);
        assert_eq!(buckets[1].key, WeekKey::new(2023, 2));
        assert_eq!(buckets[1].len(), 1);
    }

    #[test]
    fn test_sunday_new_year_belongs_to_previous_iso_year() {
        let input = vec![
            reading("2023-01-01 00:00:00", 20.0, "A"),
            reading("2023-01-02 12:00:00", 21.5, "A"),
            reading("2023-01-09 08:00:00", 19.0, "B"),
        ];
        let keys: Vec<_> = WeekBatcher::new(input).map(|b| b.key).collect();
        assert_eq!(
            keys,
            vec![WeekKey::new(2022, 52), WeekKey::new(2023, 1), WeekKey::new(2023, 2)]
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(WeekBatcher::new(Vec::new()).count(), 0);
    }

    #[test]
    fn test_concatenation_reproduces_input() {
        let input = hourly("2023-12-20 05:00:00", 24 * 40);
        let buckets: Vec<_> = WeekBatcher::new(input.clone()).collect();

        let rejoined: Vec<_> = buckets
            .iter()
            .flat_map(|b| b.rows.iter())
            .map(|r| (r.event_timestamp, r.temperature, r.sensor_name.clone()))
            .collect();
        let expected: Vec<_> = input
            .iter()
            .map(|r| (r.event_timestamp, r.temperature, r.sensor_name.clone()))
            .collect();
        assert_eq!(rejoined, expected);
    }

    #[test]
    fn test_same_bucket_iff_same_iso_week() {
        let input = hourly("2023-12-20 05:00:00", 24 * 40);
        let buckets: Vec<_> = WeekBatcher::new(input.clone()).collect();

        let assignment: Vec<usize> = buckets
            .iter()
            .enumerate()
            .flat_map(|(i, b)| std::iter::repeat(i).take(b.len()))
            .collect();
        assert_eq!(assignment.len(), input.len());

        for i in 1..input.len() {
            let same_week = input[i - 1].week_key() == input[i].week_key();
            let same_bucket = assignment[i - 1] == assignment[i];
            assert_eq!(same_week, same_bucket, "rows {} and {}", i - 1, i);
        }

        // Buckets arrive in non-decreasing week order and every row matches its bucket key.
        for pair in buckets.windows(2) {
            assert!(pair[0].key < pair[1].key);
        }
        for bucket in &buckets {
            assert!(bucket.rows.iter().all(|r| WeekKey::of(&r.event_timestamp) == bucket.key));
        }
    }

    #[test]
    fn test_final_bucket_flushed_on_exhaustion() {
        let input = hourly("2023-01-02 00:00:00", 3);
        let mut batcher = WeekBatcher::new(input);
        let only = batcher.next().unwrap();
        assert_eq!(only.len(), 3);
        assert!(batcher.next().is_none());
        assert!(batcher.next().is_none());
    }

    #[test]
    fn test_points_mirror_rows() {
        let input = hourly("2023-01-07 20:00:00", 10);
        for bucket in WeekBatcher::new(input) {
            assert_eq!(bucket.rows.len(), bucket.points.len());
            let tag = bucket.key.to_string();
            assert!(bucket.points.iter().all(|p| p.tags["week"] == tag));
        }
    }
}
