//! MariaDB backends (InnoDB, MyRocks, ColumnStore)
//!
//! One schema per backend, named after it, holding a single `sensor_data`
//! table. Derived-year backends get a composite primary key, secondary
//! indexes and yearly range partitions; the others a bare heap table.

use super::{Backend, BackendDescriptor, Endpoint, InsertOutcome, InsertionStrategy, Session};
use crate::config::DatabaseConfig;
use crate::error::BackendError;
use crate::probe::StorageProbe;
use async_trait::async_trait;
use chrono::Datelike;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Row, TxOpts, Value};
use sensorbench_shared::utils::time::format_timestamp;
use sensorbench_shared::{SqlRow, SubBatch};
use tracing::{debug, info};

const TABLE_NAME: &str = "sensor_data";

/// Rows per `INSERT` statement. Keeps the placeholder count well below the
/// server's 65 535 limit.
const ROWS_PER_STATEMENT: usize = 4096;

const PLAIN_COLUMNS: &str = "\
    event_timestamp TIMESTAMP NOT NULL,
    temperature FLOAT(4) NOT NULL,
    sensor_name VARCHAR(10) NOT NULL";

const DERIVED_YEAR_COLUMNS: &str = "\
    event_timestamp TIMESTAMP NOT NULL,
    temperature FLOAT(4) NOT NULL,
    sensor_name VARCHAR(10) NOT NULL,
    year_number INT NOT NULL,
    INDEX idx_sensor (sensor_name),
    INDEX idx_event_timestamp (event_timestamp),
    INDEX idx_year (year_number),
    INDEX idx_sensor_event (sensor_name, event_timestamp),
    INDEX idx_year_sensor_event_timestamp (year_number, sensor_name, event_timestamp),
    PRIMARY KEY (year_number, sensor_name, event_timestamp)";

const YEAR_PARTITIONS: &str = "\
PARTITION BY RANGE (year_number) (
    PARTITION p2022 VALUES LESS THAN (2023),
    PARTITION p2023 VALUES LESS THAN (2024),
    PARTITION p2024 VALUES LESS THAN (2025),
    PARTITION pMax VALUES LESS THAN MAXVALUE
)";

pub struct MariaDbBackend {
    descriptor: BackendDescriptor,
    host: String,
    port: u16,
    user: String,
    password: String,
    probe: StorageProbe,
}

impl MariaDbBackend {
    pub fn new(
        descriptor: BackendDescriptor,
        credentials: &DatabaseConfig,
        probe: StorageProbe,
    ) -> anyhow::Result<Self> {
        let (host, port) = match &descriptor.endpoint {
            Endpoint::Sql { host, port } => (host.clone(), *port),
            other => anyhow::bail!("{} needs a SQL endpoint, got {:?}", descriptor.name, other),
        };
        if descriptor.engine.sql_engine().is_none() {
            anyhow::bail!("{} has no SQL engine", descriptor.name);
        }

        Ok(Self {
            descriptor,
            host,
            port,
            user: credentials.user.clone(),
            password: credentials.password.clone(),
            probe,
        })
    }

    fn opts(&self, database: Option<&str>) -> Opts {
        OptsBuilder::default()
            .ip_or_hostname(self.host.clone())
            .tcp_port(self.port)
            .user(Some(self.user.clone()))
            .pass(Some(self.password.clone()))
            .db_name(database.map(str::to_string))
            .into()
    }

    fn derived_year(&self) -> bool {
        self.descriptor.strategy == InsertionStrategy::DerivedYear
    }

    /// `CREATE TABLE` for this backend's engine and strategy.
    pub fn table_ddl(&self) -> String {
        let engine = self.descriptor.engine.sql_engine().unwrap_or("InnoDB");
        if self.derived_year() {
            format!(
                "CREATE TABLE {} (\n{}\n) ENGINE={}\n{}",
                TABLE_NAME, DERIVED_YEAR_COLUMNS, engine, YEAR_PARTITIONS
            )
        } else {
            format!("CREATE TABLE {} (\n{}\n) ENGINE={}", TABLE_NAME, PLAIN_COLUMNS, engine)
        }
    }

    async fn recreate_schema(&self) -> Result<(), BackendError> {
        let name = self.descriptor.name.as_str();

        let mut conn = Conn::new(self.opts(None)).await?;
        let outcome = recreate_database(&mut conn, name).await;
        disconnect_quietly(conn, name).await;
        outcome?;

        let mut conn = Conn::new(self.opts(Some(name))).await?;
        let outcome = conn.query_drop(self.table_ddl()).await.map_err(BackendError::from);
        disconnect_quietly(conn, name).await;
        outcome
    }
}

async fn recreate_database(conn: &mut Conn, name: &str) -> Result<(), BackendError> {
    let existing: Option<String> = conn
        .query_first(format!("SHOW DATABASES LIKE '{}'", name))
        .await?;
    if existing.is_some() {
        info!("Schema {} exists, dropping it", name);
        conn.query_drop(format!("DROP DATABASE `{}`", name)).await?;
    }
    conn.query_drop(format!("CREATE DATABASE `{}`", name)).await?;
    Ok(())
}

async fn disconnect_quietly(conn: Conn, name: &str) {
    if let Err(e) = conn.disconnect().await {
        debug!("Disconnect from {} failed: {}", name, e);
    }
}

#[async_trait]
impl Backend for MariaDbBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn provision(&self) -> Result<(), BackendError> {
        self.recreate_schema()
            .await
            .map_err(BackendError::into_provisioning)?;
        info!(
            "Provisioned {} ({}), storage {}",
            self.descriptor.name,
            self.descriptor.engine.sql_engine().unwrap_or("?"),
            self.storage_size().await
        );
        Ok(())
    }

    async fn open_session(&self) -> Result<Box<dyn Session>, BackendError> {
        let conn = Conn::new(self.opts(Some(&self.descriptor.name))).await?;
        Ok(Box::new(MariaDbSession {
            conn: Some(conn),
            derived_year: self.derived_year(),
        }))
    }

    async fn storage_size(&self) -> String {
        self.probe.size().await
    }
}

pub struct MariaDbSession {
    conn: Option<Conn>,
    derived_year: bool,
}

impl MariaDbSession {
    fn conn(&mut self) -> Result<&mut Conn, BackendError> {
        self.conn
            .as_mut()
            .ok_or_else(|| BackendError::Connection("session already closed".to_string()))
    }
}

#[async_trait]
impl Session for MariaDbSession {
    async fn bulk_insert(&mut self, batch: SubBatch<'_>) -> Result<InsertOutcome, BackendError> {
        let derived_year = self.derived_year;
        let conn = self.conn()?;

        let mut tx = conn.start_transaction(TxOpts::default()).await?;
        for chunk in batch.rows.chunks(ROWS_PER_STATEMENT) {
            let (statement, params) = insert_statement(chunk, derived_year);
            tx.exec_drop(statement, Params::Positional(params)).await?;
        }
        tx.commit().await?;

        Ok(InsertOutcome {
            written: batch.rows.len(),
            skipped: 0,
        })
    }

    async fn execute_query(&mut self, statement: &str) -> Result<usize, BackendError> {
        let rows: Vec<Row> = self.conn()?.query(statement).await?;
        Ok(rows.len())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        if let Some(conn) = self.conn.take() {
            conn.disconnect().await?;
        }
        Ok(())
    }
}

/// Multi-row `INSERT` with positional placeholders.
fn insert_statement(rows: &[SqlRow], derived_year: bool) -> (String, Vec<Value>) {
    let (columns, tuple, width) = if derived_year {
        (
            "event_timestamp, temperature, sensor_name, year_number",
            "(?, ?, ?, ?)",
            4,
        )
    } else {
        ("event_timestamp, temperature, sensor_name", "(?, ?, ?)", 3)
    };

    let placeholders = vec![tuple; rows.len()].join(", ");
    let statement = format!("INSERT INTO {} ({}) VALUES {}", TABLE_NAME, columns, placeholders);

    let mut params = Vec::with_capacity(rows.len() * width);
    for row in rows {
        params.push(Value::from(format_timestamp(&row.event_timestamp)));
        params.push(Value::from(row.temperature));
        params.push(Value::from(row.sensor_name.clone()));
        if derived_year {
            let year = row.year_number.unwrap_or_else(|| row.event_timestamp.year());
            params.push(Value::from(year));
        }
    }
    (statement, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LINEUP;
    use sensorbench_shared::utils::time::parse_timestamp;

    fn backend(index: usize) -> MariaDbBackend {
        let descriptor = BackendDescriptor::new(
            &LINEUP[index],
            Endpoint::Sql {
                host: "localhost".to_string(),
                port: 3308,
            },
            "unused",
        );
        MariaDbBackend::new(descriptor, &DatabaseConfig::default(), StorageProbe::Disabled).unwrap()
    }

    fn row(ts: &str, year: Option<i32>) -> SqlRow {
        SqlRow {
            event_timestamp: parse_timestamp(ts).unwrap(),
            temperature: 21.5,
            sensor_name: "Sensor A".to_string(),
            year_number: year,
        }
    }

    #[test]
    fn test_plain_ddl() {
        let ddl = backend(0).table_ddl();
        assert!(ddl.contains("ENGINE=InnoDB"));
        assert!(!ddl.contains("year_number"));
        assert!(!ddl.contains("PARTITION"));

        assert!(backend(3).table_ddl().contains("ENGINE=ColumnStore"));
    }

    #[test]
    fn test_derived_year_ddl() {
        let ddl = backend(2).table_ddl();
        assert!(ddl.contains("ENGINE=ROCKSDB"));
        assert!(ddl.contains("PRIMARY KEY (year_number, sensor_name, event_timestamp)"));
        assert!(ddl.contains("PARTITION pMax VALUES LESS THAN MAXVALUE"));
        assert!(ddl.contains("idx_year_sensor_event_timestamp"));
    }

    #[test]
    fn test_insert_statement_plain() {
        let rows = vec![row("2023-01-02 00:00:00", None), row("2023-01-02 01:00:00", None)];
        let (sql, params) = insert_statement(&rows, false);
        assert_eq!(
            sql,
            "INSERT INTO sensor_data (event_timestamp, temperature, sensor_name) VALUES (?, ?, ?), (?, ?, ?)"
        );
        assert_eq!(params.len(), 6);
        assert_eq!(params[0], Value::from("2023-01-02 00:00:00".to_string()));
    }

    #[test]
    fn test_insert_statement_derived_year_fills_missing_year() {
        let rows = vec![row("2022-12-31 23:00:00", Some(2022)), row("2023-01-01 00:00:00", None)];
        let (sql, params) = insert_statement(&rows, true);
        assert!(sql.ends_with("VALUES (?, ?, ?, ?), (?, ?, ?, ?)"));
        assert_eq!(params[3], Value::from(2022));
        assert_eq!(params[7], Value::from(2023));
    }

    #[test]
    fn test_rejects_http_endpoint() {
        let descriptor = BackendDescriptor::new(
            &LINEUP[0],
            Endpoint::Http {
                url: "http://localhost".to_string(),
            },
            "unused",
        );
        assert!(MariaDbBackend::new(descriptor, &DatabaseConfig::default(), StorageProbe::Disabled).is_err());
    }
}
