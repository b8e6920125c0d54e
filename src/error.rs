use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Classification attached to every database error at the executor boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// The database could not be reached (socket, TLS, pool exhaustion)
    Connectivity,
    /// The referenced table or schema does not exist
    UnknownTable,
    /// Any other failure reported while executing a statement
    Query,
}

/// Error returned by a [`QueryExecutor`](crate::db::QueryExecutor).
///
/// `code` is a machine-readable identifier (the MySQL error number where one
/// exists) and is used verbatim as the `code` label of the scrape error counter.
#[derive(Debug, Clone, Error)]
#[error("{message} (code {code})")]
pub struct DbError {
    pub kind: DbErrorKind,
    pub code: String,
    pub message: String,
}

impl DbError {
    pub fn new(kind: DbErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(DbErrorKind::Connectivity, CONNECTIVITY_CODE, message)
    }

    pub fn unknown_table(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DbErrorKind::UnknownTable, code, message)
    }

    pub fn query(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DbErrorKind::Query, code, message)
    }
}

/// Error code used when the database is unreachable
pub const CONNECTIVITY_CODE: &str = "connectivity";

/// Error code used when a count query exceeds its timeout
pub const TIMEOUT_CODE: &str = "timeout";

/// Error code used when a scrape cycle panicked or was cancelled
pub const ABORTED_CODE: &str = "aborted";

/// Cycle-level failure: table discovery did not complete.
#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    #[error("database unreachable: {0}")]
    Connectivity(DbError),
    #[error("table discovery query failed: {0}")]
    Query(DbError),
}

impl ScrapeError {
    /// Label value recorded on the scrape error counter
    pub fn code(&self) -> &str {
        match self {
            Self::Connectivity(err) | Self::Query(err) => &err.code,
        }
    }
}

impl From<DbError> for ScrapeError {
    fn from(err: DbError) -> Self {
        match err.kind {
            DbErrorKind::Connectivity => Self::Connectivity(err),
            DbErrorKind::UnknownTable | DbErrorKind::Query => Self::Query(err),
        }
    }
}

/// Per-table failure reported by the row counter.
#[derive(Debug, Clone, Error)]
pub enum CountError {
    /// The table (or its schema) vanished between discovery and counting
    #[error("table does not exist (code {code})")]
    MissingTable { code: String },
    /// Transient failure; the previously published value is kept
    #[error("count failed: {message} (code {code})")]
    Failed { code: String, message: String },
}

impl CountError {
    pub fn code(&self) -> &str {
        match self {
            Self::MissingTable { code } | Self::Failed { code, .. } => code,
        }
    }

    pub fn timeout(after_secs: u64) -> Self {
        Self::Failed {
            code: TIMEOUT_CODE.to_string(),
            message: format!("count query timed out after {}s", after_secs),
        }
    }
}

impl From<DbError> for CountError {
    fn from(err: DbError) -> Self {
        match err.kind {
            DbErrorKind::UnknownTable => Self::MissingTable { code: err.code },
            DbErrorKind::Connectivity | DbErrorKind::Query => Self::Failed {
                code: err.code,
                message: err.message,
            },
        }
    }
}

/// Application error types surfaced over HTTP
#[derive(Debug, Error)]
pub enum AppError {
    /// Failed to encode the exposition body
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

impl From<prometheus::Error> for AppError {
    fn from(err: prometheus::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}
