use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{QueryExecutor, Row};
use crate::error::DbError;

/// Scripted executor for unit tests: fixed catalog rows and per-statement scalars.
pub(crate) struct FakeExecutor {
    pub rows: Mutex<Result<Vec<Row>, DbError>>,
    pub scalars: Mutex<HashMap<String, Result<f64, DbError>>>,
    pub row_queries: AtomicUsize,
    pub scalar_queries: AtomicUsize,
}

impl FakeExecutor {
    pub fn with_tables(tables: &[(&str, &str)]) -> Self {
        let rows = tables
            .iter()
            .map(|(s, t)| vec![s.to_string(), t.to_string()])
            .collect();
        Self {
            rows: Mutex::new(Ok(rows)),
            scalars: Mutex::new(HashMap::new()),
            row_queries: AtomicUsize::new(0),
            scalar_queries: AtomicUsize::new(0),
        }
    }

    pub fn set_scalar(&self, sql: &str, value: Result<f64, DbError>) {
        self.scalars.lock().unwrap().insert(sql.to_string(), value);
    }
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn query_rows(&self, _sql: &str) -> Result<Vec<Row>, DbError> {
        self.row_queries.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap().clone()
    }

    async fn query_scalar(&self, sql: &str) -> Result<f64, DbError> {
        self.scalar_queries.fetch_add(1, Ordering::SeqCst);
        self.scalars
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .unwrap_or_else(|| Err(DbError::unknown_table("1146", format!("no such table for {sql}"))))
    }
}
