use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("invalid ticker: {0}")]
    InvalidTicker(String),

    #[error("database unreachable: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("recommendation counts sum to zero for {stock} on {date}")]
    DivisionByZero { stock: String, date: chrono::NaiveDate },

    #[error("remote price fetch failed: {0}")]
    RemoteFetch(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Serializable tag of a [`DashboardError`], carried into the render model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTicker,
    Connection,
    Query,
    DivisionByZero,
    RemoteFetch,
    Config,
}

impl DashboardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTicker(_) => ErrorKind::InvalidTicker,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Query(_) => ErrorKind::Query,
            Self::DivisionByZero { .. } => ErrorKind::DivisionByZero,
            Self::RemoteFetch(_) => ErrorKind::RemoteFetch,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<sqlx::Error> for DashboardError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_) => Self::Connection(e.to_string()),
            sqlx::Error::Database(ref db)
                if db.code().is_some_and(|c| is_connection_sqlstate(&c)) =>
            {
                Self::Connection(e.to_string())
            }
            other => Self::Query(other.to_string()),
        }
    }
}

/// SQLSTATE classes raised by the server before any query runs: connection exception (08),
/// invalid authorization (28), unknown database (3D) and startup in progress (57P03).
fn is_connection_sqlstate(code: &str) -> bool {
    ["08", "28", "3D"].iter().any(|class| code.starts_with(class)) || code == "57P03"
}

impl From<reqwest::Error> for DashboardError {
    fn from(e: reqwest::Error) -> Self {
        Self::RemoteFetch(e.to_string())
    }
}

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;
