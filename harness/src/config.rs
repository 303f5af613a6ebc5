//! Benchmark configuration
//!
//! Loaded once at start-up from an INI (or any format the `config` crate
//! detects by extension) and layered with `SENSORBENCH_` environment
//! overrides, e.g. `SENSORBENCH_BENCHMARK__ROUNDS=5`.

use crate::storage::LINEUP;
use crate::{DEFAULT_BATCH_SIZE, DEFAULT_ROUNDS};
use serde::Deserialize;
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Flat `{backend}_host` / `{backend}_port` entries.
    #[serde(default)]
    pub mariadb: HashMap<String, String>,

    #[serde(default)]
    pub influxdb: InfluxConfig,

    #[serde(default)]
    pub benchmark: BenchmarkConfig,
}

/// Credentials shared by every SQL backend.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            user: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfluxConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub bucket: String,
    /// Docker volume sized by the storage probe
    #[serde(default = "default_influx_volume")]
    pub volume: String,
    /// Per-request limit; requests are never cut off when unset
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            org: String::new(),
            bucket: String::new(),
            volume: default_influx_volume(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkConfig {
    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,
    #[serde(default = "default_insertion_output")]
    pub insertion_output: PathBuf,
    #[serde(default = "default_query_output")]
    pub query_output: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    /// Prometheus text dump written at the end of the run
    #[serde(default)]
    pub metrics_output: Option<PathBuf>,
    /// Comma-separated subset of the lineup; empty means all of it
    #[serde(default)]
    pub backends: Option<String>,
    /// Run `du` through `sudo` when sizing container mounts
    #[serde(default = "default_probe_sudo")]
    pub probe_sudo: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            insertion_output: default_insertion_output(),
            query_output: default_query_output(),
            batch_size: default_batch_size(),
            rounds: default_rounds(),
            metrics_output: None,
            backends: None,
            probe_sudo: default_probe_sudo(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_influx_volume() -> String {
    "influxdb-data".to_string()
}

fn default_dataset() -> PathBuf {
    PathBuf::from("data/sensor_data_2_years.csv")
}

fn default_insertion_output() -> PathBuf {
    PathBuf::from("output/insertion_times.csv")
}

fn default_query_output() -> PathBuf {
    PathBuf::from("output/query_times.csv")
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_rounds() -> u32 {
    DEFAULT_ROUNDS
}

fn default_probe_sudo() -> bool {
    true
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub dataset: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub rounds: Option<u32>,
    pub backends: Vec<String>,
    pub metrics_output: Option<PathBuf>,
}

/// Resolved address of one SQL backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlEndpoint {
    pub host: String,
    pub port: u16,
}

impl BenchConfig {
    /// Load `path` (if it exists) and apply environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("SENSORBENCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(dataset) = overrides.dataset {
            self.benchmark.dataset = dataset;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.benchmark.batch_size = batch_size;
        }
        if let Some(rounds) = overrides.rounds {
            self.benchmark.rounds = rounds;
        }
        if !overrides.backends.is_empty() {
            self.benchmark.backends = Some(overrides.backends.join(","));
        }
        if overrides.metrics_output.is_some() {
            self.benchmark.metrics_output = overrides.metrics_output;
        }
    }

    /// Checks that hold for every run, live or dry.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.benchmark.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }

        if self.benchmark.rounds == 0 {
            anyhow::bail!("Rounds must be at least 1");
        }

        for name in self.requested_backends() {
            if !LINEUP.iter().any(|entry| entry.name == name) {
                anyhow::bail!("Unknown backend: {}", name);
            }
        }

        if self.selected_backends().is_empty() {
            anyhow::bail!("No backends selected");
        }

        Ok(())
    }

    /// Checks that only matter when talking to real databases.
    pub fn validate_live(&self) -> anyhow::Result<()> {
        self.validate()?;

        for name in self.selected_backends() {
            if name == "influxdb" {
                let influx = &self.influxdb;
                for (key, value) in [
                    ("url", &influx.url),
                    ("token", &influx.token),
                    ("org", &influx.org),
                    ("bucket", &influx.bucket),
                ] {
                    if value.trim().is_empty() {
                        anyhow::bail!("[influxdb] {} is not set", key);
                    }
                }
            } else {
                if self.database.user.trim().is_empty() {
                    anyhow::bail!("[database] user is not set");
                }
                self.sql_endpoint(name)?;
            }
        }

        Ok(())
    }

    /// Host and port for a SQL backend. A missing host falls back to
    /// `[database] host`; a missing port is an error.
    pub fn sql_endpoint(&self, backend: &str) -> anyhow::Result<SqlEndpoint> {
        let port_key = format!("{}_port", backend);
        let port = match self.mariadb.get(&port_key) {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .map_err(|e| anyhow::anyhow!("[mariadb] {} = {:?}: {}", port_key, port, e))?,
            None => anyhow::bail!("[mariadb] {} is not set", port_key),
        };
        let host = self
            .mariadb
            .get(&format!("{}_host", backend))
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| self.database.host.clone());
        Ok(SqlEndpoint { host, port })
    }

    /// Lineup names selected for this run, in lineup order.
    pub fn selected_backends(&self) -> Vec<&'static str> {
        let requested = self.requested_backends();
        LINEUP
            .iter()
            .map(|entry| entry.name)
            .filter(|name| requested.is_empty() || requested.contains(name))
            .collect()
    }

    fn requested_backends(&self) -> Vec<&str> {
        self.benchmark
            .backends
            .as_deref()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Round numbers of the query phase. Runs `rounds - 1` rounds, numbered
    /// from 1, matching the historical output this harness is compared with.
    pub fn query_rounds(&self) -> Range<u32> {
        1..self.benchmark.rounds
    }

    /// Round number stamped on every insertion record.
    pub fn insertion_round(&self) -> u32 {
        self.benchmark.rounds
    }
}
