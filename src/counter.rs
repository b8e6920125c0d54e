use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::db::QueryExecutor;
use crate::error::CountError;
use crate::table::{TableCount, TableRef};

/// Counts rows of a single table with exactly one query.
#[derive(Clone)]
pub struct RowCounter {
    executor: Arc<dyn QueryExecutor>,
    timeout: Duration,
}

impl RowCounter {
    pub fn new(executor: Arc<dyn QueryExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    pub fn count_query(table: &TableRef) -> String {
        format!("SELECT COUNT(*) FROM {}", table.quoted())
    }

    /// Count `table`. Never retries; a timeout is reported as a generic
    /// failure with code `timeout`.
    #[instrument(skip(self), fields(table = %table), level = "debug")]
    pub async fn count(&self, table: &TableRef) -> Result<f64, CountError> {
        let sql = Self::count_query(table);
        match timeout(self.timeout, self.executor.query_scalar(&sql)).await {
            Ok(Ok(count)) => {
                debug!(count, "Counted rows");
                Ok(count)
            }
            Ok(Err(e)) => Err(CountError::from(e)),
            Err(_) => Err(CountError::timeout(self.timeout.as_secs())),
        }
    }

    /// [`count`](Self::count) wrapped with the table and observation time
    pub async fn observe(&self, table: TableRef) -> TableCount {
        let result = self.count(&table).await;
        TableCount {
            table,
            result,
            observed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::FakeExecutor;
    use crate::db::QueryExecutor;
    use crate::error::{DbError, TIMEOUT_CODE};
    use async_trait::async_trait;

    fn counter(executor: FakeExecutor) -> RowCounter {
        RowCounter::new(Arc::new(executor), Duration::from_secs(5))
    }

    #[test]
    fn test_count_query_is_quoted() {
        assert_eq!(
            RowCounter::count_query(&TableRef::new("a", "t1")),
            "SELECT COUNT(*) FROM `a`.`t1`"
        );
    }

    #[tokio::test]
    async fn test_count_success() {
        let executor = FakeExecutor::with_tables(&[]);
        executor.set_scalar("SELECT COUNT(*) FROM `a`.`t1`", Ok(5.0));
        assert_eq!(counter(executor).count(&TableRef::new("a", "t1")).await.unwrap(), 5.0);
    }

    #[tokio::test]
    async fn test_unknown_table_is_missing_table() {
        let executor = FakeExecutor::with_tables(&[]);
        let err = counter(executor).count(&TableRef::new("a", "gone")).await.unwrap_err();
        assert!(matches!(err, CountError::MissingTable { .. }));
    }

    #[tokio::test]
    async fn test_generic_error_keeps_code() {
        let executor = FakeExecutor::with_tables(&[]);
        executor.set_scalar(
            "SELECT COUNT(*) FROM `a`.`t1`",
            Err(DbError::query("1205", "Lock wait timeout exceeded")),
        );
        let err = counter(executor).count(&TableRef::new("a", "t1")).await.unwrap_err();
        assert_eq!(err.code(), "1205");
        assert!(matches!(err, CountError::Failed { .. }));
    }

    struct StalledExecutor;

    #[async_trait]
    impl QueryExecutor for StalledExecutor {
        async fn query_rows(&self, _sql: &str) -> Result<Vec<crate::db::Row>, DbError> {
            Ok(Vec::new())
        }

        async fn query_scalar(&self, _sql: &str) -> Result<f64, DbError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_times_out() {
        let counter = RowCounter::new(Arc::new(StalledExecutor), Duration::from_secs(2));
        let err = counter.count(&TableRef::new("a", "slow")).await.unwrap_err();
        assert_eq!(err.code(), TIMEOUT_CODE);
    }
}
