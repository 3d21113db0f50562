//! Shared agent state: snapshot cache and subscription registry.

use std::sync::Arc;

use crate::cache::SnapshotCache;
use crate::config::AgentConfig;
use crate::query::{SearchBackend, WindowedAggregateQuery};
use crate::subscription::SubscriptionManager;

#[derive(Clone)]
pub struct AppState {
    // One query per tick, shared by push and pull
    pub cache: Arc<SnapshotCache>,
    pub subscriptions: Arc<SubscriptionManager>,
}

impl AppState {
    pub fn new(cfg: &AgentConfig, backend: Arc<dyn SearchBackend>) -> Self {
        let query = WindowedAggregateQuery::from_config(cfg);
        let deadline = cfg.backend_timeout.unwrap_or(cfg.interval);
        let cache = Arc::new(
            SnapshotCache::new(backend, query, cfg.interval).with_deadline(deadline),
        );
        let subscriptions = Arc::new(SubscriptionManager::new(Arc::clone(&cache), cfg.interval));
        Self {
            cache,
            subscriptions,
        }
    }
}
