use async_trait::async_trait;
use sqlx::mysql::{MySqlDatabaseError, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row as _;
use std::time::Duration;
use tracing::warn;

use super::{QueryExecutor, Row};
use crate::config::DatabaseConfig;
use crate::error::DbError;

/// ER_NO_SUCH_TABLE
const ER_NO_SUCH_TABLE: u16 = 1146;
/// ER_BAD_DB_ERROR (schema dropped)
const ER_BAD_DB_ERROR: u16 = 1049;

/// [`QueryExecutor`] backed by a lazily-connected sqlx MySQL pool.
///
/// The pool's `max_connections` is the hard bound on concurrent queries;
/// callers that exceed it wait for a free connection.
#[derive(Clone)]
pub struct MySqlExecutor {
    pool: MySqlPool,
}

impl MySqlExecutor {
    /// Build the pool without connecting.
    ///
    /// Fails only if the DSN cannot be parsed; an unreachable server surfaces
    /// later as a `Connectivity` error on the first query.
    pub fn connect_lazy(url: &str, config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect_lazy(url)?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl QueryExecutor for MySqlExecutor {
    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>, DbError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        Ok(rows.iter().filter_map(decode_row).collect())
    }

    async fn query_scalar(&self, sql: &str) -> Result<f64, DbError> {
        let value: i64 = sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(value as f64)
    }
}

/// Decode every column as text. information_schema columns are VARCHAR on
/// some servers and VARBINARY on others, so fall back to lossy UTF-8.
///
/// A row with a column that is neither is dropped.
fn decode_row(row: &MySqlRow) -> Option<Row> {
    (0..row.len())
        .map(|idx| {
            let text = decode_text(row.try_get::<String, _>(idx).ok(), || {
                row.try_get::<Vec<u8>, _>(idx).ok()
            });
            if text.is_none() {
                warn!(column = idx, "Skipping row with an undecodable column");
            }
            text
        })
        .collect()
}

fn decode_text(text: Option<String>, bytes: impl FnOnce() -> Option<Vec<u8>>) -> Option<String> {
    text.or_else(|| bytes().map(|b| String::from_utf8_lossy(&b).into_owned()))
}

/// Map a driver error onto the executor's error contract
pub(crate) fn classify(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DbError::connectivity(err.to_string()),
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match db_err.try_downcast_ref::<MySqlDatabaseError>() {
                Some(mysql_err) => {
                    let number = mysql_err.number();
                    if number == ER_NO_SUCH_TABLE || number == ER_BAD_DB_ERROR {
                        DbError::unknown_table(number.to_string(), message)
                    } else {
                        DbError::query(number.to_string(), message)
                    }
                }
                None => {
                    let code = db_err
                        .code()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|| "unknown".to_string());
                    DbError::query(code, message)
                }
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            DbError::query("decode", err.to_string())
        }
        other => DbError::query("unknown", other.to_string()),
    }
}
