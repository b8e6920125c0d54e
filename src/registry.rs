use chrono::{DateTime, Utc};
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::error::AppError;
use crate::table::TableRef;

pub const NAMESPACE: &str = "mysql";
pub const SUBSYSTEM: &str = "count_exporter";

/// A published row count series
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEntry {
    pub table: TableRef,
    pub value: f64,
    pub last_updated: DateTime<Utc>,
}

/// Every registry mutation produced by one scrape cycle.
///
/// Applied in one step by [`MetricRegistry::apply`] so a concurrent render
/// sees either none or all of it.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub upserts: Vec<(TableRef, f64, DateTime<Utc>)>,
    pub evictions: Vec<TableRef>,
    pub error_codes: Vec<String>,
    /// Discovered set to sweep against; `None` skips the sweep
    pub sweep: Option<HashSet<TableRef>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub upserted: usize,
    pub evicted: usize,
    pub swept: usize,
}

/// Owns the row count gauges and the scrape error counter.
///
/// The prometheus registry is private to this instance; nothing is registered
/// globally, so several registries can coexist (one per test, for example).
pub struct MetricRegistry {
    registry: Registry,
    row_count: GaugeVec,
    scrape_errors: IntCounterVec,
    entries: RwLock<HashMap<TableRef, MetricEntry>>,
}

impl MetricRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let row_count = GaugeVec::new(
            Opts::new("row_count", "Number of rows in the table")
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
            &["schema", "table"],
        )?;
        let scrape_errors = IntCounterVec::new(
            Opts::new("scrape_errors", "Total number of times a mysql error occurred.")
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
            &["code"],
        )?;

        let registry = Registry::new();
        registry.register(Box::new(row_count.clone()))?;
        registry.register(Box::new(scrape_errors.clone()))?;

        Ok(Self {
            registry,
            row_count,
            scrape_errors,
            entries: RwLock::new(HashMap::new()),
        })
    }

    /// Create or overwrite the series for `table`
    pub fn upsert(&self, table: TableRef, value: f64) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.upsert_locked(&mut entries, table, value, Utc::now());
    }

    /// Remove the series for `table`. Returns false if it was not tracked.
    pub fn evict(&self, table: &TableRef) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.evict_locked(&mut entries, table)
    }

    /// Evict every tracked series not in `current`; returns how many were dropped
    pub fn sweep(&self, current: &HashSet<TableRef>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.sweep_locked(&mut entries, current)
    }

    /// Evict every tracked series
    pub fn clear_all(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let cleared = entries.len();
        entries.clear();
        self.row_count.reset();
        cleared
    }

    pub fn record_error(&self, code: &str) {
        self.scrape_errors.with_label_values(&[code]).inc();
    }

    /// Apply one cycle's results: evictions, then upserts, then the sweep
    pub fn apply(&self, reconciliation: Reconciliation) -> ReconcileSummary {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut summary = ReconcileSummary::default();

        for code in &reconciliation.error_codes {
            self.scrape_errors.with_label_values(&[code.as_str()]).inc();
        }

        for table in &reconciliation.evictions {
            if self.evict_locked(&mut entries, table) {
                summary.evicted += 1;
            }
        }

        for (table, value, observed_at) in reconciliation.upserts {
            self.upsert_locked(&mut entries, table, value, observed_at);
            summary.upserted += 1;
        }

        if let Some(current) = &reconciliation.sweep {
            summary.swept = self.sweep_locked(&mut entries, current);
        }

        debug!(
            upserted = summary.upserted,
            evicted = summary.evicted,
            swept = summary.swept,
            tracked = entries.len(),
            "Registry reconciled"
        );
        summary
    }

    pub fn get(&self, table: &TableRef) -> Option<MetricEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All published series, ordered by schema then table
    pub fn snapshot(&self) -> Vec<MetricEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot: Vec<MetricEntry> = entries.values().cloned().collect();
        snapshot.sort_by(|a, b| a.table.cmp(&b.table));
        snapshot
    }

    pub fn error_count(&self, code: &str) -> u64 {
        self.scrape_errors.with_label_values(&[code]).get()
    }

    /// Prometheus text exposition of the row counts and the error counter
    pub fn render(&self) -> Result<String, AppError> {
        let families = {
            let _entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            self.registry.gather()
        };

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| AppError::Encoding(e.to_string()))
    }

    fn upsert_locked(
        &self,
        entries: &mut HashMap<TableRef, MetricEntry>,
        table: TableRef,
        value: f64,
        observed_at: DateTime<Utc>,
    ) {
        self.row_count
            .with_label_values(&[table.schema(), table.table()])
            .set(value);
        entries.insert(
            table.clone(),
            MetricEntry {
                table,
                value,
                last_updated: observed_at,
            },
        );
    }

    fn evict_locked(&self, entries: &mut HashMap<TableRef, MetricEntry>, table: &TableRef) -> bool {
        if entries.remove(table).is_none() {
            return false;
        }
        // Only fails when the series is absent, which the map rules out
        let _ = self
            .row_count
            .remove_label_values(&[table.schema(), table.table()]);
        true
    }

    fn sweep_locked(
        &self,
        entries: &mut HashMap<TableRef, MetricEntry>,
        current: &HashSet<TableRef>,
    ) -> usize {
        let stale: Vec<TableRef> = entries
            .keys()
            .filter(|t| !current.contains(*t))
            .cloned()
            .collect();
        for table in &stale {
            self.evict_locked(entries, table);
        }
        stale.len()
    }
}
