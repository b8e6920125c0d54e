use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::db::QueryExecutor;
use crate::error::ScrapeError;
use crate::table::TableRef;

/// Every user table outside the server's own schemas
pub const LIST_TABLES_QUERY: &str = "
    SELECT
        TABLE_SCHEMA,
        TABLE_NAME
    FROM information_schema.tables
    WHERE TABLE_SCHEMA NOT IN ('sys', 'mysql', 'performance_schema', 'information_schema')
";

/// Compiled ignore predicate over `schema.table`.
///
/// An absent or empty pattern disables ignoring entirely.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    pattern: Option<Regex>,
}

impl IgnoreFilter {
    pub fn new(pattern: Option<&str>) -> Result<Self, regex::Error> {
        let pattern = match pattern.map(str::trim) {
            Some(p) if !p.is_empty() => Some(Regex::new(p)?),
            _ => None,
        };
        Ok(Self { pattern })
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_ignored(&self, table: &TableRef) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|re| re.is_match(&table.qualified_name()))
    }
}

/// Lists countable tables from the catalog.
pub struct TableDiscovery {
    executor: Arc<dyn QueryExecutor>,
    ignore: IgnoreFilter,
}

impl TableDiscovery {
    pub fn new(executor: Arc<dyn QueryExecutor>, ignore: IgnoreFilter) -> Self {
        Self { executor, ignore }
    }

    /// Query the catalog once. No retry: the refresh loop owns retry policy.
    ///
    /// An empty catalog is a successful, empty result.
    #[instrument(skip(self), level = "debug")]
    pub async fn discover(&self) -> Result<Vec<TableRef>, ScrapeError> {
        let rows = self.executor.query_rows(LIST_TABLES_QUERY).await?;

        let mut seen = HashSet::with_capacity(rows.len());
        let mut tables = Vec::with_capacity(rows.len());
        let mut ignored = 0usize;

        for row in rows {
            let [schema, table, ..] = row.as_slice() else {
                warn!(columns = row.len(), "Skipping malformed catalog row");
                continue;
            };
            if schema.is_empty() || table.is_empty() {
                warn!(schema = %schema, table = %table, "Skipping catalog row with an empty name");
                continue;
            }

            let table_ref = TableRef::new(schema.as_str(), table.as_str());
            if self.ignore.is_ignored(&table_ref) {
                ignored += 1;
                continue;
            }

            if seen.insert(table_ref.clone()) {
                tables.push(table_ref);
            }
        }

        debug!(tables = tables.len(), ignored, "Table discovery complete");
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::FakeExecutor;
    use crate::error::DbError;

    fn discovery(executor: FakeExecutor, pattern: Option<&str>) -> TableDiscovery {
        TableDiscovery::new(Arc::new(executor), IgnoreFilter::new(pattern).unwrap())
    }

    #[tokio::test]
    async fn test_discover_lists_tables() {
        let d = discovery(FakeExecutor::with_tables(&[("a", "t1"), ("a", "t2")]), None);
        let tables = d.discover().await.unwrap();
        assert_eq!(tables, vec![TableRef::new("a", "t1"), TableRef::new("a", "t2")]);
    }

    #[tokio::test]
    async fn test_ignore_pattern_drops_matches() {
        let d = discovery(
            FakeExecutor::with_tables(&[("app", "users"), ("app", "tmp_import"), ("audit", "log")]),
            Some(r"^(app\.tmp_.*|audit\..*)$"),
        );
        let tables = d.discover().await.unwrap();
        assert_eq!(tables, vec![TableRef::new("app", "users")]);
    }

    #[tokio::test]
    async fn test_empty_pattern_ignores_nothing() {
        let d = discovery(FakeExecutor::with_tables(&[("a", "t1")]), Some(""));
        assert_eq!(d.discover().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_catalog_is_not_an_error() {
        let d = discovery(FakeExecutor::with_tables(&[]), None);
        assert!(d.discover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_rows_and_duplicates_are_skipped() {
        let executor = FakeExecutor::with_tables(&[("a", "t1"), ("a", "t1")]);
        executor.rows.lock().unwrap().as_mut().unwrap().push(vec!["lonely".to_string()]);
        let d = discovery(executor, None);
        assert_eq!(d.discover().await.unwrap(), vec![TableRef::new("a", "t1")]);
    }

    #[tokio::test]
    async fn test_rows_with_empty_names_are_skipped() {
        let executor = FakeExecutor::with_tables(&[("a", ""), ("", "t1"), ("a", "t2")]);
        let d = discovery(executor, None);
        assert_eq!(d.discover().await.unwrap(), vec![TableRef::new("a", "t2")]);
    }

    #[tokio::test]
    async fn test_query_failure_is_classified() {
        let executor = FakeExecutor::with_tables(&[]);
        *executor.rows.lock().unwrap() = Err(DbError::connectivity("connection refused"));
        let err = discovery(executor, None).discover().await.unwrap_err();
        assert!(matches!(err, ScrapeError::Connectivity(_)));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(IgnoreFilter::new(Some("[")).is_err());
    }
}
