use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use crate::error::CountError;

/// Schema-qualified table identifier.
///
/// Cheap to clone: both parts are shared strings since the same ref travels
/// from discovery through every counting task into the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    schema: Arc<str>,
    table: Arc<str>,
}

impl TableRef {
    pub fn new(schema: impl Into<Arc<str>>, table: impl Into<Arc<str>>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `schema.table`, the string the ignore pattern is matched against
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Backtick-quoted identifier safe to splice into a MySQL statement
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Outcome of counting one table during a cycle
#[derive(Debug, Clone)]
pub struct TableCount {
    pub table: TableRef,
    pub result: Result<f64, CountError>,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name() {
        let t = TableRef::new("shop", "orders");
        assert_eq!(t.qualified_name(), "shop.orders");
        assert_eq!(t.to_string(), "shop.orders");
    }

    #[test]
    fn test_quoted_escapes_backticks() {
        let t = TableRef::new("odd`schema", "t");
        assert_eq!(t.quoted(), "`odd``schema`.`t`");
    }
}
