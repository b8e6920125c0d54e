//! Query execution boundary.
//!
//! Everything above this module talks to the database through [`QueryExecutor`]
//! and only ever sees [`DbError`] values, already classified into a
//! [`DbErrorKind`](crate::error::DbErrorKind). Driver error types never leak out.

pub mod dsn;
pub mod mysql;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

use crate::error::DbError;

pub use mysql::MySqlExecutor;

/// One result row, every column decoded as text
pub type Row = Vec<String>;

#[async_trait]
pub trait QueryExecutor: Send + Sync + 'static {
    /// Run a statement and return all rows.
    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>, DbError>;

    /// Run a statement returning a single numeric value (first column of the first row).
    async fn query_scalar(&self, sql: &str) -> Result<f64, DbError>;
}
