//! Query battery
//!
//! Seven analytical query shapes, each rendered per dialect with the same
//! date ranges, sensor tags and aggregation windows. The text is opaque to
//! the drivers: they only run it, time it and count the rows that come back.

/// The canonical query shapes, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryShape {
    /// One year of `Sensor A`.
    OneYearA,
    /// One full day, every sensor.
    OneDayFull,
    /// Weekly mean of `Sensor B` over five months.
    WeeklyMeanB,
    /// Monthly sum of `Sensor A` over the whole dataset.
    MonthlySumA,
    /// 15-minute mean of `Sensor A` over the whole dataset.
    QuarterHourMeanA,
    /// Min and max over ten days, every sensor.
    MinMaxTenDays,
    /// Total row count.
    CountAll,
}

impl QueryShape {
    pub const ALL: [QueryShape; 7] = [
        QueryShape::OneYearA,
        QueryShape::OneDayFull,
        QueryShape::WeeklyMeanB,
        QueryShape::MonthlySumA,
        QueryShape::QuarterHourMeanA,
        QueryShape::MinMaxTenDays,
        QueryShape::CountAll,
    ];

    /// Value written to the `query_type` column.
    pub fn label(&self) -> &'static str {
        match self {
            Self::OneYearA => "1_year_a",
            Self::OneDayFull => "1_day_full",
            Self::WeeklyMeanB => "group_mean_6months_week_b",
            Self::MonthlySumA => "group_sum_month_a",
            Self::QuarterHourMeanA => "group_mean_min_a",
            Self::MinMaxTenDays => "max_min_10days_full",
            Self::CountAll => "count_line_full",
        }
    }
}

/// How a backend spells the battery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialect {
    /// Plain SQL over `event_timestamp` ranges.
    Sql,
    /// SQL that also pins `year_number` so the range partitions get pruned.
    PartitionedSql,
    /// Flux against the named bucket.
    Flux { bucket: String },
}

impl Dialect {
    pub fn statement(&self, shape: QueryShape) -> String {
        match self {
            Self::Sql => plain_sql(shape).to_string(),
            Self::PartitionedSql => partitioned_sql(shape).to_string(),
            Self::Flux { bucket } => flux(shape, bucket),
        }
    }
}

fn plain_sql(shape: QueryShape) -> &'static str {
    match shape {
        QueryShape::OneYearA => {
            "SELECT event_timestamp, temperature, sensor_name \
             FROM sensor_data \
             WHERE event_timestamp >= '2023-01-01 00:00:00' \
             AND event_timestamp < '2024-01-01 00:00:00' \
             AND sensor_name = 'Sensor A'"
        }
        QueryShape::OneDayFull => {
            "SELECT event_timestamp, temperature, sensor_name \
             FROM sensor_data \
             WHERE event_timestamp >= '2023-01-02 00:00:00' \
             AND event_timestamp < '2023-01-03 00:00:00'"
        }
        QueryShape::WeeklyMeanB => {
            "SELECT YEARWEEK(event_timestamp, 1) AS week_interval, AVG(temperature) AS avg_temp \
             FROM sensor_data \
             WHERE sensor_name = 'Sensor B' \
             AND event_timestamp >= '2023-01-02 00:00:00' \
             AND event_timestamp < '2023-06-01 00:00:00' \
             GROUP BY week_interval \
             ORDER BY week_interval"
        }
        QueryShape::MonthlySumA => {
            "SELECT DATE_FORMAT(event_timestamp, '%Y-%m') AS month_start, SUM(temperature) AS sum_temperature \
             FROM sensor_data \
             WHERE sensor_name = 'Sensor A' \
             GROUP BY month_start \
             ORDER BY month_start"
        }
        QueryShape::QuarterHourMeanA => QUARTER_HOUR_MEAN_SQL,
        QueryShape::MinMaxTenDays => {
            "SELECT MAX(temperature) AS max_temp, MIN(temperature) AS min_temp \
             FROM sensor_data \
             WHERE event_timestamp >= '2023-01-01 00:00:00' \
             AND event_timestamp < '2023-01-10 00:00:00'"
        }
        QueryShape::CountAll => COUNT_SQL,
    }
}

fn partitioned_sql(shape: QueryShape) -> &'static str {
    match shape {
        QueryShape::OneYearA => {
            "SELECT event_timestamp, temperature, sensor_name \
             FROM sensor_data \
             WHERE year_number = 2023 \
             AND sensor_name = 'Sensor A'"
        }
        QueryShape::OneDayFull => {
            "SELECT event_timestamp, temperature, sensor_name \
             FROM sensor_data \
             WHERE year_number = 2023 \
             AND event_timestamp BETWEEN '2023-01-02 00:00:00' AND '2023-01-02 23:59:59'"
        }
        QueryShape::WeeklyMeanB => {
            "SELECT YEARWEEK(event_timestamp, 1) AS week_interval, AVG(temperature) AS avg_temp \
             FROM sensor_data \
             WHERE year_number = 2023 \
             AND sensor_name = 'Sensor B' \
             AND event_timestamp BETWEEN '2023-01-02 00:00:00' AND '2023-05-31 23:59:59' \
             GROUP BY week_interval \
             ORDER BY week_interval"
        }
        QueryShape::MonthlySumA => {
            "SELECT YEAR(event_timestamp) AS year, MONTH(event_timestamp) AS month, SUM(temperature) AS sum_temperature \
             FROM sensor_data \
             WHERE sensor_name = 'Sensor A' \
             GROUP BY year, month \
             ORDER BY year, month"
        }
        QueryShape::QuarterHourMeanA => QUARTER_HOUR_MEAN_SQL,
        QueryShape::MinMaxTenDays => {
            "SELECT MAX(temperature) AS max_temp, MIN(temperature) AS min_temp \
             FROM sensor_data \
             WHERE year_number = 2023 \
             AND event_timestamp BETWEEN '2023-01-01 00:00:00' AND '2023-01-09 23:59:59'"
        }
        QueryShape::CountAll => COUNT_SQL,
    }
}

const QUARTER_HOUR_MEAN_SQL: &str = "\
SELECT FROM_UNIXTIME(FLOOR(UNIX_TIMESTAMP(event_timestamp) / (15 * 60)) * (15 * 60)) AS interval_15min, \
AVG(temperature) AS avg_temp \
FROM sensor_data \
WHERE sensor_name = 'Sensor A' \
GROUP BY interval_15min \
ORDER BY interval_15min";

const COUNT_SQL: &str = "SELECT COUNT(*) FROM sensor_data";

fn flux(shape: QueryShape, bucket: &str) -> String {
    let body = match shape {
        QueryShape::OneYearA => {
            r#"|> range(start: 2023-01-01T00:00:00Z, stop: 2024-01-01T00:00:00Z)
|> filter(fn: (r) => r._measurement == "sensor_data")
|> filter(fn: (r) => r._field == "temperature")
|> filter(fn: (r) => r.sensor_name == "Sensor A")
|> keep(columns: ["_time", "_value", "sensor_name"])
|> yield(name: "complete_data")"#
        }
        QueryShape::OneDayFull => {
            r#"|> range(start: 2023-01-02T00:00:00Z, stop: 2023-01-03T00:00:00Z)
|> filter(fn: (r) => r._measurement == "sensor_data")
|> filter(fn: (r) => r._field == "temperature")
|> keep(columns: ["_time", "_value", "sensor_name"])
|> yield(name: "complete_data")"#
        }
        QueryShape::WeeklyMeanB => {
            r#"|> range(start: 2023-01-02T00:00:00Z, stop: 2023-06-01T00:00:00Z)
|> filter(fn: (r) => r._measurement == "sensor_data")
|> filter(fn: (r) => r.sensor_name == "Sensor B")
|> filter(fn: (r) => r._field == "temperature")
|> keep(columns: ["_time", "_value", "sensor_name"])
|> group()
|> aggregateWindow(every: 1w, fn: mean, createEmpty: false)"#
        }
        QueryShape::MonthlySumA => {
            r#"|> range(start: 0)
|> filter(fn: (r) => r._measurement == "sensor_data")
|> filter(fn: (r) => r.sensor_name == "Sensor A")
|> filter(fn: (r) => r._field == "temperature")
|> keep(columns: ["_time", "_value", "sensor_name"])
|> group()
|> aggregateWindow(every: 1mo, fn: sum, createEmpty: false)"#
        }
        QueryShape::QuarterHourMeanA => {
            r#"|> range(start: 0)
|> filter(fn: (r) => r._measurement == "sensor_data")
|> filter(fn: (r) => r.sensor_name == "Sensor A")
|> filter(fn: (r) => r._field == "temperature")
|> aggregateWindow(every: 15m, fn: mean, createEmpty: false)
|> group(columns: ["_time"])
|> map(fn: (r) => ({ _time: r._time, _value: r._value }))"#
        }
        QueryShape::MinMaxTenDays => {
            r#"|> range(start: 2023-01-01T00:00:00Z, stop: 2023-01-10T00:00:00Z)
|> filter(fn: (r) => r._measurement == "sensor_data")
|> filter(fn: (r) => r._field == "temperature")
|> keep(columns: ["_time", "_value", "sensor_name"])
|> reduce(
    identity: {max: float(v: "-inf"), min: float(v: "inf")},
    fn: (r, accumulator) => ({
        max: if r._value > accumulator.max then r._value else accumulator.max,
        min: if r._value < accumulator.min then r._value else accumulator.min
    })
)"#
        }
        QueryShape::CountAll => {
            r#"|> range(start: 0)
|> filter(fn: (r) => r._measurement == "sensor_data")
|> count(column: "_value")
|> yield(name: "row_count")"#
        }
    };
    format!("from(bucket: \"{}\")\n{}", bucket, body)
}
