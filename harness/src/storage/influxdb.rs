//! InfluxDB 2.x backend
//!
//! Talks to the HTTP API directly: bucket management under
//! `/api/v2/buckets`, writes as line protocol with second precision, and
//! Flux queries answered as annotated CSV.

use super::{Backend, BackendDescriptor, InsertOutcome, Session};
use crate::config::InfluxConfig;
use crate::error::BackendError;
use crate::probe::StorageProbe;
use crate::report;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use sensorbench_shared::utils::time::unix_seconds;
use sensorbench_shared::{SubBatch, TaggedPoint};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct Settings {
    url: String,
    token: String,
    org: String,
    bucket: String,
    /// Unset means requests may run for as long as the server takes
    request_timeout: Option<Duration>,
}

impl Settings {
    fn from_config(config: &InfluxConfig) -> Self {
        Self {
            url: config.url.clone(),
            token: config.token.clone(),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            request_timeout: config.request_timeout_secs.map(Duration::from_secs),
        }
    }

    fn client(&self) -> Result<Client, BackendError> {
        let mut builder = Client::builder().connect_timeout(CONNECT_TIMEOUT);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().map_err(BackendError::from)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, format!("Token {}", self.token))
    }
}

#[derive(Debug, Deserialize)]
struct BucketList {
    #[serde(default)]
    buckets: Vec<IdEntry>,
}

#[derive(Debug, Deserialize)]
struct OrgList {
    #[serde(default)]
    orgs: Vec<IdEntry>,
}

#[derive(Debug, Deserialize)]
struct IdEntry {
    id: String,
}

pub struct InfluxBackend {
    descriptor: BackendDescriptor,
    settings: Settings,
    probe: StorageProbe,
}

impl InfluxBackend {
    pub fn new(descriptor: BackendDescriptor, config: &InfluxConfig, probe: StorageProbe) -> anyhow::Result<Self> {
        if config.url.trim().is_empty() {
            anyhow::bail!("{} needs [influxdb] url", descriptor.name);
        }
        Ok(Self {
            descriptor,
            settings: Settings::from_config(config),
            probe,
        })
    }

    async fn recreate_bucket(&self) -> Result<(), BackendError> {
        let s = &self.settings;
        let client = s.client()?;

        let existing: BucketList = checked(
            s.authorize(client.get(s.endpoint("/api/v2/buckets")))
                .query(&[("name", s.bucket.as_str()), ("org", s.org.as_str())])
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;

        for bucket in existing.buckets {
            info!("Bucket {} exists, deleting it", s.bucket);
            checked(
                s.authorize(client.delete(s.endpoint(&format!("/api/v2/buckets/{}", bucket.id))))
                    .send()
                    .await?,
            )
            .await?;
        }

        let orgs: OrgList = checked(
            s.authorize(client.get(s.endpoint("/api/v2/orgs")))
                .query(&[("org", s.org.as_str())])
                .send()
                .await?,
        )
        .await?
        .json()
        .await?;
        let org_id = orgs
            .orgs
            .into_iter()
            .next()
            .map(|o| o.id)
            .ok_or_else(|| BackendError::Provisioning(format!("organization {} not found", s.org)))?;

        checked(
            s.authorize(client.post(s.endpoint("/api/v2/buckets")))
                .json(&json!({
                    "orgID": org_id,
                    "name": s.bucket,
                    "retentionRules": [],
                }))
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for InfluxBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn provision(&self) -> Result<(), BackendError> {
        self.recreate_bucket()
            .await
            .map_err(BackendError::into_provisioning)?;
        info!(
            "Provisioned {} (bucket {}), storage {}",
            self.descriptor.name,
            self.settings.bucket,
            self.storage_size().await
        );
        Ok(())
    }

    async fn open_session(&self) -> Result<Box<dyn Session>, BackendError> {
        let s = &self.settings;
        let client = s.client()?;
        checked(client.get(s.endpoint("/health")).send().await?).await?;
        Ok(Box::new(InfluxSession {
            backend: self.descriptor.name.clone(),
            settings: self.settings.clone(),
            client: Some(client),
        }))
    }

    async fn storage_size(&self) -> String {
        self.probe.size().await
    }
}

pub struct InfluxSession {
    backend: String,
    settings: Settings,
    client: Option<Client>,
}

impl InfluxSession {
    fn client(&self) -> Result<&Client, BackendError> {
        self.client
            .as_ref()
            .ok_or_else(|| BackendError::Connection("session already closed".to_string()))
    }
}

#[async_trait]
impl Session for InfluxSession {
    async fn bulk_insert(&mut self, batch: SubBatch<'_>) -> Result<InsertOutcome, BackendError> {
        let mut body = String::new();
        let mut outcome = InsertOutcome::default();

        for point in batch.points {
            match point.validate() {
                Ok(()) => {
                    body.push_str(&line_protocol(point));
                    body.push('\n');
                    outcome.written += 1;
                }
                Err(e) => {
                    report::point_skipped(&self.backend, batch.key, &e);
                    outcome.skipped += 1;
                }
            }
        }
        if outcome.written == 0 {
            return Ok(outcome);
        }

        let s = &self.settings;
        let request = s
            .authorize(self.client()?.post(s.endpoint("/api/v2/write")))
            .query(&[
                ("org", s.org.as_str()),
                ("bucket", s.bucket.as_str()),
                ("precision", "s"),
            ])
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        checked(request.send().await?).await?;
        Ok(outcome)
    }

    async fn execute_query(&mut self, statement: &str) -> Result<usize, BackendError> {
        let s = &self.settings;
        let request = s
            .authorize(self.client()?.post(s.endpoint("/api/v2/query")))
            .query(&[("org", s.org.as_str())])
            .header(CONTENT_TYPE, "application/vnd.flux")
            .header(ACCEPT, "application/csv")
            .body(statement.to_string());
        let text = checked(request.send().await?).await?.text().await?;
        count_csv_rows(&text)
            .map_err(|e| BackendError::Execution(format!("unreadable query response: {}", e)))
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        // Dropping the client releases its pooled connections.
        if self.client.take().is_some() {
            debug!("Closed session to {}", self.backend);
        }
        Ok(())
    }
}

/// Map a non-2xx response to an error carrying the server's message.
async fn checked(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().path().to_string();
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<body unreadable: {}>", e));
    let message = format!("{} {}: {}", status, url, body.trim());
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(BackendError::Connection(message))
    } else {
        Err(BackendError::Execution(message))
    }
}

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// One line of InfluxDB line protocol, timestamp in seconds.
pub fn line_protocol(point: &TaggedPoint) -> String {
    let mut line = escape(&point.measurement, &[',', ' ']);
    for (key, value) in &point.tags {
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape(key, &[',', '=', ' ']));
        line.push('=');
        line.push_str(&escape(value, &[',', '=', ' ']));
    }
    let fields: Vec<String> = point
        .fields
        .iter()
        .map(|(key, value)| format!("{}={}", escape(key, &[',', '=', ' ']), value))
        .collect();
    line.push(' ');
    line.push_str(&fields.join(","));
    line.push(' ');
    line.push_str(&unix_seconds(&point.time).to_string());
    line
}

/// Data rows in an annotated-CSV query response. Annotation lines start
/// with `#`; every table opens with a header row whose third column is
/// `table`.
fn count_csv_rows(text: &str) -> Result<usize, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(text.as_bytes());

    let mut rows = 0;
    for record in reader.records() {
        let record = record?;
        if record.get(2) != Some("table") {
            rows += 1;
        }
    }
    Ok(rows)
}
