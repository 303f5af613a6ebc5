//! Dataset reader
//!
//! Streams `(event_timestamp, temperature, sensor_name)` rows from the source
//! CSV, skipping the header. The file is assumed sorted by timestamp and is
//! never sorted here. Unparseable rows are logged and skipped.

use sensorbench_shared::SensorReading;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("cannot open dataset {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Lazy iterator over the readings of one dataset pass.
pub struct DatasetReader<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    skipped: u64,
}

impl DatasetReader<File> {
    pub fn open(path: &Path) -> Result<Self, DatasetError> {
        let reader = Self::builder()
            .from_path(path)
            .map_err(|source| DatasetError::Open {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::from_csv(reader))
    }
}

impl<R: Read> DatasetReader<R> {
    pub fn from_reader(rdr: R) -> Self {
        Self::from_csv(Self::builder().from_reader(rdr))
    }

    fn builder() -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder.has_headers(true).flexible(true).trim(csv::Trim::All);
        builder
    }

    fn from_csv(reader: csv::Reader<R>) -> Self {
        Self {
            records: reader.into_records(),
            skipped: 0,
        }
    }

    /// Rows dropped so far because they could not be parsed.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<R: Read> Iterator for DatasetReader<R> {
    type Item = SensorReading;

    fn next(&mut self) -> Option<SensorReading> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => {
                    self.skipped += 1;
                    warn!("Skipping unreadable dataset row: {}", e);
                    continue;
                }
            };
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let parsed = if record.len() != 3 {
                Err(sensorbench_shared::ParseError::ColumnCount(record.len()))
            } else {
                SensorReading::from_fields(&record[0], &record[1], &record[2])
            };
            match parsed {
                Ok(reading) => return Some(reading),
                Err(e) => {
                    self.skipped += 1;
                    warn!("Skipping dataset line {}: {}", line, e);
                }
            }
        }
    }
}
