use arc_swap::ArcSwapOption;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::counter::RowCounter;
use crate::discovery::TableDiscovery;
use crate::error::{CountError, ScrapeError, ABORTED_CODE};
use crate::registry::{MetricEntry, MetricRegistry, Reconciliation};
use crate::table::{TableCount, TableRef};

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Success {
        tables: usize,
        counted: usize,
        missing: usize,
        failed: usize,
    },
    /// Discovery failed; the registry was left as it was (or cleared, see `cleared`)
    DiscoveryFailed(ScrapeError),
    /// The cycle task panicked or was cancelled before reconciling
    Aborted(String),
}

/// Result of one scrape cycle, shared by every caller that waited on it
#[derive(Debug, Clone)]
pub struct ScrapeReport {
    pub generation: u64,
    pub outcome: CycleOutcome,
    /// Registry contents after the cycle
    pub published: Vec<MetricEntry>,
    pub consecutive_failures: u32,
    /// True if this cycle cleared every row count series
    pub cleared: bool,
    pub duration: Duration,
}

impl ScrapeReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Success { .. })
    }
}

type SharedScrape = Shared<BoxFuture<'static, Arc<ScrapeReport>>>;

struct InFlight {
    generation: u64,
    scrape: SharedScrape,
}

/// Drives scrape cycles: discovery, bounded fan-out of row counts, and
/// reconciliation into the [`MetricRegistry`].
///
/// At most one cycle runs at a time. [`scrape_once`](Self::scrape_once)
/// callers arriving while a cycle is in flight wait for that cycle and
/// receive the same report instead of starting another one.
pub struct ScrapeCoordinator {
    discovery: TableDiscovery,
    counter: RowCounter,
    registry: Arc<MetricRegistry>,
    limiter: Arc<Semaphore>,
    failure_threshold: u32,
    failure_streak: AtomicU32,
    generation: AtomicU64,
    in_flight: Mutex<Option<InFlight>>,
    last_report: ArcSwapOption<ScrapeReport>,
}

impl ScrapeCoordinator {
    pub fn new(
        discovery: TableDiscovery,
        counter: RowCounter,
        registry: Arc<MetricRegistry>,
        max_concurrency: usize,
        failure_threshold: u32,
    ) -> Self {
        Self {
            discovery,
            counter,
            registry,
            limiter: Arc::new(Semaphore::new(max_concurrency.max(1))),
            failure_threshold: failure_threshold.max(1),
            failure_streak: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            last_report: ArcSwapOption::empty(),
        }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Report of the most recently completed cycle, if any
    pub fn last_report(&self) -> Option<Arc<ScrapeReport>> {
        self.last_report.load_full()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failure_streak.load(Ordering::Acquire)
    }

    /// Run a scrape cycle, or join the one already in flight.
    ///
    /// Never fails: discovery and count errors are absorbed into the report
    /// and the scrape error counter. The cycle runs on its own task, so a
    /// caller that stops waiting does not cancel it for the others.
    pub async fn scrape_once(self: &Arc<Self>) -> Arc<ScrapeReport> {
        let scrape = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.as_ref() {
                Some(current) => {
                    debug!(generation = current.generation, "Joining in-flight scrape");
                    current.scrape.clone()
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                    let scrape = self.spawn_cycle(generation);
                    *in_flight = Some(InFlight {
                        generation,
                        scrape: scrape.clone(),
                    });
                    scrape
                }
            }
        };

        scrape.await
    }

    fn spawn_cycle(self: &Arc<Self>, generation: u64) -> SharedScrape {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let report = Arc::new(this.run_cycle(generation).await);
            this.finish(generation, Arc::clone(&report));
            report
        });

        // The task never reaches `finish` if it panics; release the slot here
        let this = Arc::clone(self);
        async move {
            match handle.await {
                Ok(report) => report,
                Err(e) => {
                    error!(generation, error = %e, "Scrape cycle aborted");
                    let report = Arc::new(this.abort_cycle(generation, e.to_string()));
                    this.finish(generation, Arc::clone(&report));
                    report
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Publish the report and let the next caller start a new cycle
    fn finish(&self, generation: u64, report: Arc<ScrapeReport>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        self.last_report.store(Some(report));
        if in_flight.as_ref().is_some_and(|c| c.generation == generation) {
            *in_flight = None;
        }
    }

    async fn run_cycle(&self, generation: u64) -> ScrapeReport {
        let started = Instant::now();

        let tables = match self.discovery.discover().await {
            Ok(tables) => tables,
            Err(err) => return self.fail_cycle(generation, err, started),
        };
        crate::metrics::record_tables_discovered(tables.len());

        let counts = self.count_all(&tables).await;

        let mut reconciliation = Reconciliation {
            sweep: Some(tables.iter().cloned().collect::<HashSet<TableRef>>()),
            ..Default::default()
        };
        let (mut counted, mut missing, mut failed) = (0, 0, 0);

        for TableCount { table, result, observed_at } in counts {
            match result {
                Ok(value) => {
                    counted += 1;
                    reconciliation.upserts.push((table, value, observed_at));
                }
                Err(CountError::MissingTable { code }) => {
                    missing += 1;
                    info!(table = %table, code = %code, "Table disappeared, evicting its series");
                    reconciliation.error_codes.push(code);
                    reconciliation.evictions.push(table);
                }
                Err(err) => {
                    failed += 1;
                    warn!(table = %table, error = %err, "Error counting rows, keeping previous value");
                    reconciliation.error_codes.push(err.code().to_string());
                }
            }
        }
        // Tables whose count task died are neither upserted nor evicted
        failed += tables.len() - (counted + missing + failed);

        let summary = self.registry.apply(reconciliation);
        self.failure_streak.store(0, Ordering::Release);

        let duration = started.elapsed();
        crate::metrics::record_scrape(true, duration);
        crate::metrics::record_failure_streak(0);
        info!(
            generation,
            tables = tables.len(),
            counted,
            missing,
            failed,
            evicted = summary.evicted,
            swept = summary.swept,
            duration_ms = duration.as_millis() as u64,
            "Scrape cycle complete"
        );

        ScrapeReport {
            generation,
            outcome: CycleOutcome::Success {
                tables: tables.len(),
                counted,
                missing,
                failed,
            },
            published: self.registry.snapshot(),
            consecutive_failures: 0,
            cleared: false,
            duration,
        }
    }

    /// Count every table, at most `max_concurrency` at a time.
    ///
    /// All tasks are joined before returning; dropping this future aborts the
    /// outstanding ones, so nothing partial reaches the registry.
    async fn count_all(&self, tables: &[TableRef]) -> Vec<TableCount> {
        let mut tasks = JoinSet::new();
        for table in tables.iter().cloned() {
            let counter = self.counter.clone();
            let limiter = Arc::clone(&self.limiter);
            tasks.spawn(async move {
                let _permit = limiter.acquire_owned().await.ok();
                counter.observe(table).await
            });
        }

        let mut counts = Vec::with_capacity(tables.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(count) => counts.push(count),
                Err(e) => error!(error = %e, "Count task failed"),
            }
        }
        counts
    }

    fn fail_cycle(&self, generation: u64, err: ScrapeError, started: Instant) -> ScrapeReport {
        let (streak, cleared) = self.record_failure(err.code());

        let duration = started.elapsed();
        crate::metrics::record_scrape(false, duration);
        warn!(generation, streak, error = %err, "Table discovery failed");

        ScrapeReport {
            generation,
            outcome: CycleOutcome::DiscoveryFailed(err),
            published: self.registry.snapshot(),
            consecutive_failures: streak,
            cleared,
            duration,
        }
    }

    fn abort_cycle(&self, generation: u64, reason: String) -> ScrapeReport {
        let (streak, cleared) = self.record_failure(ABORTED_CODE);
        crate::metrics::record_scrape(false, Duration::ZERO);

        ScrapeReport {
            generation,
            outcome: CycleOutcome::Aborted(reason),
            published: self.registry.snapshot(),
            consecutive_failures: streak,
            cleared,
            duration: Duration::ZERO,
        }
    }

    /// Count a failed cycle; clears every series once the streak reaches the threshold.
    /// Returns the new streak and whether the registry was cleared.
    fn record_failure(&self, code: &str) -> (u32, bool) {
        self.registry.record_error(code);
        let streak = self.failure_streak.fetch_add(1, Ordering::AcqRel) + 1;
        crate::metrics::record_failure_streak(streak);

        if streak < self.failure_threshold {
            return (streak, false);
        }

        let dropped = self.registry.clear_all();
        if dropped > 0 {
            warn!(
                streak,
                threshold = self.failure_threshold,
                dropped,
                "Repeated scrape failures, clearing all row counts"
            );
        }
        (streak, true)
    }
}
