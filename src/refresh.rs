use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::coordinator::ScrapeCoordinator;
use crate::signals::ShutdownSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Scraping,
    Sleeping,
}

impl RefreshState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scraping => "scraping",
            Self::Sleeping => "sleeping",
        }
    }
}

/// Repeats scrape cycles on a fixed interval, backing off while discovery keeps failing.
///
/// Clearing stale series after repeated failures is done by the coordinator;
/// this loop only decides when the next cycle starts.
pub struct RefreshLoop {
    coordinator: Arc<ScrapeCoordinator>,
    interval: Duration,
    max_backoff: Duration,
    state: watch::Sender<RefreshState>,
}

impl RefreshLoop {
    pub fn new(coordinator: Arc<ScrapeCoordinator>, interval: Duration, max_backoff: Duration) -> Self {
        let (state, _) = watch::channel(RefreshState::Idle);
        Self {
            coordinator,
            interval,
            max_backoff,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshState> {
        self.state.subscribe()
    }

    /// Delay before the next cycle given the current failure streak
    pub fn next_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.interval;
        }
        let exponent = (consecutive_failures - 1).min(16);
        let delay = self.interval.saturating_mul(1u32 << exponent);
        delay.min(self.max_backoff.max(self.interval))
    }

    /// Run until a shutdown signal arrives. A cycle still in flight at
    /// shutdown is not waited for.
    pub async fn run(self, mut shutdown: broadcast::Receiver<ShutdownSignal>) {
        info!(
            interval_secs = self.interval.as_secs(),
            max_backoff_secs = self.max_backoff.as_secs(),
            "Refresh loop started"
        );

        loop {
            self.state.send_replace(RefreshState::Scraping);
            let report = tokio::select! {
                report = self.coordinator.scrape_once() => report,
                _ = shutdown.recv() => break,
            };

            let delay = self.next_delay(report.consecutive_failures);
            debug!(
                generation = report.generation,
                success = report.is_success(),
                delay_secs = delay.as_secs(),
                "Sleeping until next scrape"
            );

            self.state.send_replace(RefreshState::Sleeping);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => break,
            }
        }

        self.state.send_replace(RefreshState::Idle);
        info!("Refresh loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::RowCounter;
    use crate::db::fake::FakeExecutor;
    use crate::discovery::{IgnoreFilter, TableDiscovery};
    use crate::error::DbError;
    use crate::registry::MetricRegistry;
    use std::sync::atomic::Ordering;

    fn coordinator(executor: Arc<FakeExecutor>) -> Arc<ScrapeCoordinator> {
        let discovery = TableDiscovery::new(executor.clone(), IgnoreFilter::disabled());
        let counter = RowCounter::new(executor, Duration::from_secs(5));
        let registry = Arc::new(MetricRegistry::new().unwrap());
        Arc::new(ScrapeCoordinator::new(discovery, counter, registry, 1, 3))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let executor = Arc::new(FakeExecutor::with_tables(&[]));
        let refresh = RefreshLoop::new(
            coordinator(executor),
            Duration::from_secs(10),
            Duration::from_secs(60),
        );

        assert_eq!(refresh.next_delay(0), Duration::from_secs(10));
        assert_eq!(refresh.next_delay(1), Duration::from_secs(10));
        assert_eq!(refresh.next_delay(2), Duration::from_secs(20));
        assert_eq!(refresh.next_delay(3), Duration::from_secs(40));
        assert_eq!(refresh.next_delay(4), Duration::from_secs(60));
        assert_eq!(refresh.next_delay(u32::MAX), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_scrapes_on_interval_and_stops_on_shutdown() {
        let executor = Arc::new(FakeExecutor::with_tables(&[("a", "t1")]));
        executor.set_scalar("SELECT COUNT(*) FROM `a`.`t1`", Ok(3.0));
        let c = coordinator(executor.clone());

        let refresh = RefreshLoop::new(c.clone(), Duration::from_secs(30), Duration::from_secs(300));
        let mut state = refresh.subscribe();
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(refresh.run(rx));

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(executor.row_queries.load(Ordering::SeqCst), 3);
        assert_eq!(c.registry().get(&crate::table::TableRef::new("a", "t1")).unwrap().value, 3.0);

        tx.send(ShutdownSignal::Graceful).unwrap();
        handle.await.unwrap();
        assert_eq!(*state.borrow_and_update(), RefreshState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_connectivity_failures() {
        let executor = Arc::new(FakeExecutor::with_tables(&[]));
        *executor.rows.lock().unwrap() = Err(DbError::connectivity("connection refused"));
        let c = coordinator(executor.clone());

        let refresh = RefreshLoop::new(c.clone(), Duration::from_secs(1), Duration::from_secs(4));
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(refresh.run(rx));

        // delays: 1, 2, 4, 4 ...
        tokio::time::sleep(Duration::from_millis(7500)).await;
        assert!(executor.row_queries.load(Ordering::SeqCst) >= 4);
        assert!(c.consecutive_failures() >= 4);

        tx.send(ShutdownSignal::Graceful).unwrap();
        handle.await.unwrap();
    }
}
