//! Tick-scoped snapshot cache: one backend query per tick, shared by every caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::query::{SearchBackend, WindowedAggregateQuery};
use crate::snapshot::Snapshot;

type SharedSnapshot = Shared<BoxFuture<'static, Result<Arc<Snapshot>>>>;

struct Entry {
    tick: u64,
    snapshot: SharedSnapshot,
}

pub struct SnapshotCache {
    backend: Arc<dyn SearchBackend>,
    query: WindowedAggregateQuery,
    interval: Duration,
    deadline: Duration,
    epoch: Instant,
    slot: Mutex<Option<Entry>>,
    issued: AtomicU64,
}

impl SnapshotCache {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        query: WindowedAggregateQuery,
        interval: Duration,
    ) -> Self {
        Self {
            backend,
            query,
            interval: interval.max(Duration::from_millis(1)),
            deadline: interval.max(Duration::from_millis(1)),
            epoch: Instant::now(),
            slot: Mutex::new(None),
            issued: AtomicU64::new(0),
        }
    }

    /// Upper bound on one backend query (defaults to the tick interval). A query
    /// that overruns it fails with `BackendQueryFailed`, so a hung request can
    /// only ever be joined until its deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline.max(Duration::from_millis(1));
        self
    }

    /// Snapshot for the current tick, computing it if this is the first request.
    pub async fn current(&self) -> Result<Arc<Snapshot>> {
        self.entry_for_now().await
    }

    /// Number of backend queries issued so far.
    pub fn queries_issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    fn tick_index(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.epoch);
        (elapsed.as_nanos() / self.interval.as_nanos()) as u64
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Entry>> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn entry_for_now(&self) -> SharedSnapshot {
        let tick = self.tick_index(Instant::now());
        let mut slot = self.lock_slot();
        if let Some(entry) = slot.as_ref() {
            if entry.tick == tick {
                return entry.snapshot.clone();
            }
            // At most one query in flight: a new tick joins a query that is still running.
            if entry.snapshot.peek().is_none() {
                debug!(tick, started = entry.tick, "previous query still in flight; joining it");
                return entry.snapshot.clone();
            }
        }
        let snapshot = self.spawn_query(tick);
        *slot = Some(Entry {
            tick,
            snapshot: snapshot.clone(),
        });
        snapshot
    }

    // Runs on its own task so a caller going away never cancels it for the others.
    fn spawn_query(&self, tick: u64) -> SharedSnapshot {
        self.issued.fetch_add(1, Ordering::Relaxed);
        let backend = Arc::clone(&self.backend);
        let query = self.query.clone();
        let deadline = self.deadline;
        debug!(tick, index = %query.index, "issuing aggregation query");
        let task = tokio::spawn(async move {
            let raw = tokio::time::timeout(deadline, query.run(backend.as_ref()))
                .await
                .unwrap_or_else(|_| {
                    Err(AgentError::backend(format!(
                        "no response within {deadline:?}"
                    )))
                })
                .map_err(|e| {
                    warn!(tick, "metricbeat query failed: {e}");
                    e
                })?;
            Ok(Arc::new(Snapshot::build(query.profile, &raw)))
        });
        async move {
            match task.await {
                Ok(res) => res,
                Err(e) => Err(AgentError::backend(format!("query task failed: {e}"))),
            }
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryProfile;
    use crate::test_support::FakeBackend;

    const TICK: Duration = Duration::from_secs(10);

    fn cache(backend: Arc<FakeBackend>) -> Arc<SnapshotCache> {
        let query = WindowedAggregateQuery {
            index: "metricbeat".into(),
            window: Duration::from_secs(900),
            profile: QueryProfile::Full,
        };
        Arc::new(SnapshotCache::new(backend, query, TICK))
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_query_per_tick() {
        let backend = FakeBackend::with_delay(Duration::from_millis(200));
        let cache = cache(backend.clone());

        let callers: Vec<_> = (0..25)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.current().await })
            })
            .collect();
        let mut snapshots = Vec::new();
        for c in callers {
            snapshots.push(c.await.unwrap().expect("snapshot"));
        }
        assert_eq!(backend.calls(), 1);
        assert!(snapshots.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));

        // Same tick: served from cache.
        cache.current().await.unwrap();
        assert_eq!(backend.calls(), 1);

        tokio::time::advance(TICK).await;
        cache.current().await.unwrap();
        assert_eq!(backend.calls(), 2);
        assert_eq!(cache.queries_issued(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_query_is_joined_across_tick_boundary() {
        let backend = FakeBackend::with_delay(Duration::from_secs(15));
        let query = WindowedAggregateQuery {
            index: "metricbeat".into(),
            window: Duration::from_secs(900),
            profile: QueryProfile::Full,
        };
        let cache = Arc::new(
            SnapshotCache::new(backend.clone(), query, TICK).with_deadline(Duration::from_secs(30)),
        );

        let first = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.current().await })
        };
        tokio::time::sleep(Duration::from_secs(11)).await;
        let second = cache.current().await.unwrap();
        let first = first.await.unwrap().unwrap();
        assert_eq!(backend.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_caller_does_not_cancel_shared_query() {
        let backend = FakeBackend::with_delay(Duration::from_secs(1));
        let cache = cache(backend.clone());

        let doomed = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.current().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        doomed.abort();

        assert!(cache.current().await.is_ok());
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_query_fails_at_deadline_and_next_tick_retries() {
        let backend = FakeBackend::with_delay(Duration::from_secs(365 * 24 * 3600));
        let cache = cache(backend.clone());

        let started = Instant::now();
        let err = cache.current().await.unwrap_err();
        assert!(matches!(err, AgentError::BackendQueryFailed(_)));
        assert_eq!(started.elapsed(), TICK);

        // The timed-out query is finished, so this tick starts a fresh one.
        let pull = tokio::time::timeout(Duration::from_secs(60), cache.current()).await;
        assert!(matches!(pull, Ok(Err(AgentError::BackendQueryFailed(_)))));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_scoped_to_its_tick() {
        let backend = FakeBackend::with_delay(Duration::ZERO);
        backend.set_failing(true);
        let cache = cache(backend.clone());

        let err = cache.current().await.unwrap_err();
        assert!(matches!(err, AgentError::BackendQueryFailed(_)));
        // No silent retry inside the same tick.
        assert!(cache.current().await.is_err());
        assert_eq!(backend.calls(), 1);

        backend.set_failing(false);
        tokio::time::advance(TICK).await;
        assert!(cache.current().await.is_ok());
        assert_eq!(backend.calls(), 2);
    }
}
