//! Timestamp helpers
//!
//! Source timestamps carry no zone; they are treated as UTC everywhere
//! (SQL literals, line-protocol epochs, Flux ranges).

use chrono::NaiveDateTime;

/// Layout of `event_timestamp` in the dataset and in SQL parameters.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a dataset timestamp (`2023-01-01 00:00:00`).
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
}

/// Render a timestamp back into dataset layout.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Seconds since UNIX epoch, interpreting `ts` as UTC.
pub fn unix_seconds(ts: &NaiveDateTime) -> i64 {
    ts.and_utc().timestamp()
}
