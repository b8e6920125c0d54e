// Shared fixtures for integration tests: an in-memory database behind the
// QueryExecutor trait and a ready-to-use configuration.
#![allow(dead_code)]

use async_trait::async_trait;
use mysql_count_exporter::{
    config::{Config, DatabaseConfig, ScrapeConfig, ScrapeMode, ServerConfig},
    counter::RowCounter,
    db::{QueryExecutor, Row},
    error::DbError,
    table::TableRef,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub struct FakeDatabase {
    tables: Mutex<Result<Vec<(String, String)>, DbError>>,
    counts: Mutex<HashMap<String, Result<f64, DbError>>>,
    pub discovery_queries: AtomicUsize,
    pub count_queries: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// When set, each discovery query consumes one permit before answering
    gate: Option<Arc<Semaphore>>,
    count_delay: Duration,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Ok(Vec::new())),
            counts: Mutex::new(HashMap::new()),
            discovery_queries: AtomicUsize::new(0),
            count_queries: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            gate: None,
            count_delay: Duration::ZERO,
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn with_count_delay(mut self, delay: Duration) -> Self {
        self.count_delay = delay;
        self
    }

    /// Add a table with a successful count
    pub fn table(self, schema: &str, table: &str, count: f64) -> Self {
        self.put_table(schema, table, Ok(count));
        self
    }

    pub fn put_table(&self, schema: &str, table: &str, count: Result<f64, DbError>) {
        if let Ok(tables) = self.tables.lock().unwrap().as_mut() {
            if !tables.iter().any(|(s, t)| s == schema && t == table) {
                tables.push((schema.to_string(), table.to_string()));
            }
        }
        self.set_count(schema, table, count);
    }

    pub fn set_count(&self, schema: &str, table: &str, count: Result<f64, DbError>) {
        let sql = RowCounter::count_query(&TableRef::new(schema, table));
        self.counts.lock().unwrap().insert(sql, count);
    }

    /// Remove from the catalog but keep answering count queries
    pub fn hide_table(&self, schema: &str, table: &str) {
        if let Ok(tables) = self.tables.lock().unwrap().as_mut() {
            tables.retain(|(s, t)| !(s == schema && t == table));
        }
    }

    /// Remove from the catalog and make count queries fail with 1146
    pub fn drop_table(&self, schema: &str, table: &str) {
        self.hide_table(schema, table);
        let sql = RowCounter::count_query(&TableRef::new(schema, table));
        self.counts.lock().unwrap().remove(&sql);
    }

    pub fn fail_discovery(&self, err: DbError) -> Vec<(String, String)> {
        let previous = std::mem::replace(&mut *self.tables.lock().unwrap(), Err(err));
        previous.unwrap_or_default()
    }

    pub fn restore_discovery(&self, tables: Vec<(String, String)>) {
        *self.tables.lock().unwrap() = Ok(tables);
    }
}

#[async_trait]
impl QueryExecutor for FakeDatabase {
    async fn query_rows(&self, _sql: &str) -> Result<Vec<Row>, DbError> {
        self.discovery_queries.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let tables = self.tables.lock().unwrap().clone()?;
        Ok(tables.into_iter().map(|(s, t)| vec![s, t]).collect())
    }

    async fn query_scalar(&self, sql: &str) -> Result<f64, DbError> {
        self.count_queries.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.count_delay.is_zero() {
            tokio::time::sleep(self.count_delay).await;
        }

        let result = self
            .counts
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .unwrap_or_else(|| Err(DbError::unknown_table("1146", "Table doesn't exist")));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn test_config(mode: ScrapeMode, max_connections: u32, failure_threshold: u32) -> Config {
    Config {
        server: ServerConfig {
            listen_address: "127.0.0.1:0".to_string(),
            metrics_path: "/metrics".to_string(),
            log_level: "debug".to_string(),
            log_format: "text".to_string(),
        },
        database: DatabaseConfig {
            dsn: "mysql://exporter@localhost:3306/".to_string(),
            max_connections,
            acquire_timeout_seconds: 5,
        },
        scrape: ScrapeConfig {
            mode,
            refresh_interval_seconds: 30,
            failure_threshold,
            max_backoff_seconds: 300,
            count_timeout_seconds: 5,
            ignore_pattern: None,
        },
    }
}

/// Parse an exposition body into (metric, labels, value) samples
pub fn parse_samples(body: &str) -> Vec<prometheus_parse::Sample> {
    prometheus_parse::Scrape::parse(body.lines().map(|l| Ok(l.to_string())))
        .expect("valid exposition format")
        .samples
}

pub fn gauge_value(sample: &prometheus_parse::Sample) -> f64 {
    match sample.value {
        prometheus_parse::Value::Gauge(v)
        | prometheus_parse::Value::Counter(v)
        | prometheus_parse::Value::Untyped(v) => v,
        _ => panic!("unexpected sample type for {}", sample.metric),
    }
}
