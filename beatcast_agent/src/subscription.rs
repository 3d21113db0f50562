//! Per-subscriber lifecycle and delivery schedule.
//!
//! Each subscriber owns one timer task. The task asks the shared
//! [`SnapshotCache`] for the current snapshot on every firing and hands the
//! shaped payload to that subscriber's channel. Delivery happens under the
//! subscription lock, so once [`SubscriptionManager::disconnect`] returns no
//! further delivery can reach the subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::SnapshotCache;
use crate::types::Delivery;
use crate::view;

pub type SubscriberId = u64;

/// Outbound frames buffered per subscriber before deliveries are dropped.
pub const DEFAULT_BUFFER: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Connected,
    Delivering,
    Disconnected,
}

struct Subscription {
    state: SubscriptionState,
    tx: Option<mpsc::Sender<Delivery>>,
    timer: Option<JoinHandle<()>>,
}

type SharedSubscription = Arc<Mutex<Subscription>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

pub struct SubscriptionManager {
    cache: Arc<SnapshotCache>,
    interval: Duration,
    buffer: usize,
    next_id: AtomicU64,
    subs: Mutex<HashMap<SubscriberId, SharedSubscription>>,
    live_timers: Arc<AtomicUsize>,
}

impl SubscriptionManager {
    pub fn new(cache: Arc<SnapshotCache>, interval: Duration) -> Self {
        Self::with_buffer(cache, interval, DEFAULT_BUFFER)
    }

    pub fn with_buffer(cache: Arc<SnapshotCache>, interval: Duration, buffer: usize) -> Self {
        Self {
            cache,
            interval: interval.max(Duration::from_millis(1)),
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            subs: Mutex::new(HashMap::new()),
            live_timers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Registers a subscriber and starts its schedule. The first delivery is immediate.
    pub fn connect(&self) -> (SubscriberId, mpsc::Receiver<Delivery>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        let sub = Arc::new(Mutex::new(Subscription {
            state: SubscriptionState::Connected,
            tx: Some(tx),
            timer: None,
        }));
        lock(&self.subs).insert(id, Arc::clone(&sub));

        let guard = TimerGuard::new(Arc::clone(&self.live_timers));
        let timer = tokio::spawn(run_schedule(
            id,
            Arc::clone(&self.cache),
            Arc::clone(&sub),
            self.interval,
            guard,
        ));
        lock(&sub).timer = Some(timer);
        info!(subscriber = id, "subscriber connected");
        (id, rx)
    }

    /// Cancels the subscriber's schedule and releases it. Returns `false` if it was
    /// already disconnected (or never existed); repeated calls are harmless.
    pub fn disconnect(&self, id: SubscriberId) -> bool {
        let Some(sub) = lock(&self.subs).remove(&id) else {
            return false;
        };
        let mut s = lock(&sub);
        if s.state == SubscriptionState::Disconnected {
            return false;
        }
        s.state = SubscriptionState::Disconnected;
        s.tx = None;
        if let Some(timer) = s.timer.take() {
            timer.abort();
        }
        info!(subscriber = id, "subscriber disconnected");
        true
    }

    pub fn state(&self, id: SubscriberId) -> Option<SubscriptionState> {
        let sub = lock(&self.subs).get(&id).cloned()?;
        let state = lock(&sub).state;
        Some(state)
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subs).len()
    }

    /// Timer tasks that have not finished yet.
    pub fn live_timers(&self) -> usize {
        self.live_timers.load(Ordering::SeqCst)
    }
}

// Counts a live timer task; released when the task ends or is aborted.
struct TimerGuard(Arc<AtomicUsize>);

impl TimerGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run_schedule(
    id: SubscriberId,
    cache: Arc<SnapshotCache>,
    sub: SharedSubscription,
    interval: Duration,
    _guard: TimerGuard,
) {
    let mut ticker = tokio::time::interval(interval);
    // Backpressure: a firing that overruns the interval skips the missed ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut healthy = true;
    loop {
        ticker.tick().await;
        let delivery = match cache.current().await {
            Ok(snapshot) => {
                healthy = true;
                Delivery::Data(view::payload(&snapshot))
            }
            Err(e) if healthy => {
                healthy = false;
                warn!(subscriber = id, "skipping delivery: {e}");
                Delivery::Stale(e.to_string())
            }
            Err(e) => {
                debug!(subscriber = id, "still failing: {e}");
                continue;
            }
        };
        if !deliver(id, &sub, delivery) {
            break;
        }
    }
    debug!(subscriber = id, "delivery schedule ended");
}

/// Hands one delivery to the subscriber. Returns `false` once it can never deliver again.
fn deliver(id: SubscriberId, sub: &Mutex<Subscription>, delivery: Delivery) -> bool {
    let mut s = lock(sub);
    if s.state == SubscriptionState::Disconnected {
        return false;
    }
    let Some(tx) = s.tx.as_ref() else {
        return false;
    };
    match tx.try_send(delivery) {
        Ok(()) => {
            s.state = SubscriptionState::Delivering;
            true
        }
        Err(TrySendError::Full(_)) => {
            debug!(subscriber = id, "subscriber lagging; dropped delivery");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
