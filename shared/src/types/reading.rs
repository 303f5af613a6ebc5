//! Source readings
//!
//! One row of the sensor dataset. Readings are parsed once from the input
//! file and never mutated afterwards.

use crate::types::bucket::WeekKey;
use crate::utils::time::parse_timestamp;
use chrono::{Datelike, NaiveDateTime};
use thiserror::Error;

/// Why a dataset row could not become a [`SensorReading`].
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("expected 3 columns, found {0}")]
    ColumnCount(usize),

    #[error("invalid event_timestamp {value:?}: {reason}")]
    Timestamp { value: String, reason: String },

    #[error("invalid temperature {0:?}")]
    Temperature(String),

    #[error("empty sensor_name")]
    SensorName,
}

/// A single sensor reading: `(event_timestamp, temperature, sensor_name)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub event_timestamp: NaiveDateTime,
    pub temperature: f64,
    pub sensor_name: String,
}

impl SensorReading {
    pub fn new(
        event_timestamp: NaiveDateTime,
        temperature: f64,
        sensor_name: impl Into<String>,
    ) -> Self {
        Self {
            event_timestamp,
            temperature,
            sensor_name: sensor_name.into(),
        }
    }

    /// Build a reading from the three raw dataset columns.
    pub fn from_fields(timestamp: &str, temperature: &str, sensor_name: &str) -> Result<Self, ParseError> {
        let event_timestamp = parse_timestamp(timestamp).map_err(|e| ParseError::Timestamp {
            value: timestamp.to_string(),
            reason: e.to_string(),
        })?;
        let temperature = temperature
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .ok_or_else(|| ParseError::Temperature(temperature.to_string()))?;
        let sensor_name = sensor_name.trim();
        if sensor_name.is_empty() {
            return Err(ParseError::SensorName);
        }

        Ok(Self::new(event_timestamp, temperature, sensor_name))
    }

    /// ISO calendar `(year, week)` this reading falls in.
    pub fn week_key(&self) -> WeekKey {
        WeekKey::of(&self.event_timestamp)
    }

    /// Calendar year, used as the partition column by the derived-year backends.
    pub fn year(&self) -> i32 {
        self.event_timestamp.year()
    }
}
