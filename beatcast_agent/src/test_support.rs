//! In-memory search backend for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{AgentError, Result};
use crate::query::SearchBackend;

pub struct FakeBackend {
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Duration,
}

impl FakeBackend {
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }
}

pub fn sample_aggregations() -> Value {
    json!({
        "CPU_gauge_user": { "value": 0.2 },
        "CPU_gauge_sys": { "value": 0.1 },
        "CPU_gauge_core": { "value": 4 },
        "Memory_gauge": { "value": 0.5 },
        "Load_5m": { "value": 1.25 },
        "Swap_usage": { "value": 0.0 },
        "Fsstat_used": { "value": 50 },
        "Fsstat_total": { "value": 200 },
        "Process": { "value": 120 },
        "In_pocketloss": { "value": 0 },
        "Out_pocketloss": { "value": 0 },
        "Used_memory": { "value": 1073741824u64 },
        "Total_memory": { "value": 4294967296u64 },
        "Top_disk": { "buckets": [ { "key": "/", "used_pct": { "value": 0.5 } } ] }
    })
}

#[async_trait]
impl SearchBackend for FakeBackend {
    async fn search(&self, _index: &str, _body: &Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AgentError::backend("connection refused"));
        }
        Ok(sample_aggregations())
    }
}
