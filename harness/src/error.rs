//! Backend error taxonomy

use thiserror::Error;

/// Failure while talking to a backend. Drivers contain these at the
/// per-backend, per-bucket or per-round level; none of them abort the run.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend unreachable, credentials rejected or the transport dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Schema or bucket reset/creation failed.
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// The backend accepted the connection but rejected the statement or write.
    #[error("execution failed: {0}")]
    Execution(String),
}

impl BackendError {
    /// Re-label any failure that happened while provisioning.
    pub fn into_provisioning(self) -> Self {
        match self {
            Self::Provisioning(msg) => Self::Provisioning(msg),
            Self::Connection(msg) => Self::Provisioning(format!("connection: {}", msg)),
            Self::Execution(msg) => Self::Provisioning(msg),
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<mysql_async::Error> for BackendError {
    fn from(e: mysql_async::Error) -> Self {
        match e {
            mysql_async::Error::Io(_) | mysql_async::Error::Url(_) => Self::Connection(e.to_string()),
            other => Self::Execution(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_builder() {
            Self::Connection(e.to_string())
        } else {
            Self::Execution(e.to_string())
        }
    }
}
