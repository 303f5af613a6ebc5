//! CSV metrics sink
//!
//! Two append-only files: insertion events and query events. Each file is
//! truncated and given its header once, at the start of its phase. Every
//! append opens the file, writes one row and closes it again, so a crash
//! loses at most the row in flight.

use sensorbench_shared::{InsertionRecord, QueryRecord, INSERTION_HEADER, QUERY_HEADER};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Clone)]
pub struct MetricsSink {
    insertion_path: PathBuf,
    query_path: PathBuf,
}

impl MetricsSink {
    pub fn new(insertion_path: impl Into<PathBuf>, query_path: impl Into<PathBuf>) -> Self {
        Self {
            insertion_path: insertion_path.into(),
            query_path: query_path.into(),
        }
    }

    pub fn insertion_path(&self) -> &Path {
        &self.insertion_path
    }

    pub fn query_path(&self) -> &Path {
        &self.query_path
    }

    pub fn init_insertion_file(&self) -> Result<(), SinkError> {
        write_header(&self.insertion_path, &INSERTION_HEADER)
    }

    pub fn init_query_file(&self) -> Result<(), SinkError> {
        write_header(&self.query_path, &QUERY_HEADER)
    }

    pub fn append_insertion(&self, record: &InsertionRecord) -> Result<(), SinkError> {
        append_row(&self.insertion_path, record)
    }

    pub fn append_query(&self, record: &QueryRecord) -> Result<(), SinkError> {
        append_row(&self.query_path, record)
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SinkError + '_ {
    move |source| SinkError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> SinkError + '_ {
    move |source| SinkError::Csv {
        path: path.display().to_string(),
        source,
    }
}

fn write_header(path: &Path, header: &[&str]) -> Result<(), SinkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(path))?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(csv_err(path))?;
    writer.write_record(header).map_err(csv_err(path))?;
    writer.flush().map_err(io_err(path))
}

fn append_row<T: Serialize>(path: &Path, record: &T) -> Result<(), SinkError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err(path))?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    writer.serialize(record).map_err(csv_err(path))?;
    writer.flush().map_err(io_err(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorbench_shared::WeekKey;
    use tempfile::TempDir;

    fn insertion(week: u32) -> InsertionRecord {
        InsertionRecord {
            table_name: "mariadb_myrocks".to_string(),
            insertion_time: 0.5,
            current_week: WeekKey::new(2023, week),
            round_number: 50,
            ram_usage: 2.0,
            swap_usage: 0.25,
            storage: "10.00 MB".to_string(),
        }
    }

    fn query(round: u32) -> QueryRecord {
        QueryRecord {
            table_name: "influxdb".to_string(),
            query_time: 0.125,
            query_type: "1_year_a".to_string(),
            round_number: round,
            ram_usage: 2.0,
            swap_usage: 0.0,
        }
    }

    #[test]
    fn test_init_creates_parent_and_header() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let sink = MetricsSink::new(dir.path().join("out/insertion.csv"), dir.path().join("out/query.csv"));

        sink.init_insertion_file()?;
        let text = fs::read_to_string(sink.insertion_path())?;
        assert_eq!(text, format!("{}\n", INSERTION_HEADER.join(",")));
        assert!(!sink.query_path().exists());
        Ok(())
    }

    #[test]
    fn test_appends_one_row_per_call() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let sink = MetricsSink::new(dir.path().join("insertion.csv"), dir.path().join("query.csv"));
        sink.init_insertion_file()?;
        sink.init_query_file()?;

        sink.append_insertion(&insertion(1))?;
        sink.append_insertion(&insertion(2))?;
        sink.append_query(&query(1))?;

        let text = fs::read_to_string(sink.insertion_path())?;
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "mariadb_myrocks,0.5,2023-1,50,2.0,0.25,10.00 MB");
        assert_eq!(lines[2], "mariadb_myrocks,0.5,2023-2,50,2.0,0.25,10.00 MB");

        let text = fs::read_to_string(sink.query_path())?;
        assert_eq!(text.lines().nth(1), Some("influxdb,0.125,1_year_a,1,2.0,0.0"));
        Ok(())
    }

    #[test]
    fn test_init_truncates_previous_run() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let sink = MetricsSink::new(dir.path().join("insertion.csv"), dir.path().join("query.csv"));
        sink.init_query_file()?;
        sink.append_query(&query(1))?;
        sink.append_query(&query(2))?;

        sink.init_query_file()?;
        let text = fs::read_to_string(sink.query_path())?;
        assert_eq!(text.lines().count(), 1);
        Ok(())
    }

    #[test]
    fn test_append_to_unwritable_path_fails() {
        let sink = MetricsSink::new("/nonexistent/dir/insertion.csv", "/nonexistent/dir/query.csv");
        assert!(matches!(sink.append_query(&query(1)), Err(SinkError::Io { .. })));
    }
}
