//! Metrics rows
//!
//! Field order and names match the CSV headers; rows are serialized with
//! `serde` and never read back by the harness.

use crate::types::bucket::WeekKey;
use serde::Serialize;

pub const INSERTION_HEADER: [&str; 7] = [
    "table_name",
    "insertion_time",
    "current_week",
    "round_number",
    "ram_usage",
    "swap_usage",
    "storage",
];

pub const QUERY_HEADER: [&str; 6] = [
    "table_name",
    "query_time",
    "query_type",
    "round_number",
    "ram_usage",
    "swap_usage",
];

/// One insertion event: a full week bucket written to one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertionRecord {
    pub table_name: String,
    /// Wall-clock seconds spent inserting every sub-batch of the bucket.
    pub insertion_time: f64,
    pub current_week: WeekKey,
    pub round_number: u32,
    /// Host RAM in use right after the insert, GiB.
    pub ram_usage: f64,
    /// Host swap in use right after the insert, GiB.
    pub swap_usage: f64,
    /// On-disk footprint observed after the insert, or a probe diagnostic.
    pub storage: String,
}

/// One query event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRecord {
    pub table_name: String,
    pub query_time: f64,
    pub query_type: String,
    pub round_number: u32,
    pub ram_usage: f64,
    pub swap_usage: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_record_csv_layout() {
        let record = InsertionRecord {
            table_name: "mariadb_innodb".to_string(),
            insertion_time: 1.5,
            current_week: WeekKey::new(2023, 1),
            round_number: 50,
            ram_usage: 3.25,
            swap_usage: 0.0,
            storage: "1.00 GB".to_string(),
        };

        let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(Vec::new());
        writer.serialize(&record).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), INSERTION_HEADER.join(","));
        assert_eq!(lines.next().unwrap(), "mariadb_innodb,1.5,2023-1,50,3.25,0.0,1.00 GB");
    }

    #[test]
    fn test_query_record_header_matches() {
        let record = QueryRecord {
            table_name: "influxdb".to_string(),
            query_time: 0.25,
            query_type: "count_line_full".to_string(),
            round_number: 3,
            ram_usage: 1.0,
            swap_usage: 0.5,
        };

        let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(Vec::new());
        writer.serialize(&record).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(text.lines().next().unwrap(), QUERY_HEADER.join(","));
    }
}
