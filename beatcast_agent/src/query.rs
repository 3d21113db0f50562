//! Windowed aggregation query against the search backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{AgentConfig, QueryProfile};
use crate::error::{AgentError, Result};

/// The `_search` contract. Implementations return the response's `aggregations` object.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, index: &str, body: &Value) -> Result<Value>;
}

/// Elasticsearch over HTTP.
#[derive(Debug, Clone)]
pub struct ElasticBackend {
    client: Client,
    base_url: String,
}

impl ElasticBackend {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder
            .build()
            .map_err(|e| AgentError::InvalidConfig(format!("unable to create http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &AgentConfig) -> Result<Self> {
        Self::new(cfg.backend_url.clone(), cfg.backend_timeout)
    }

    fn search_url(&self, index: &str) -> String {
        format!("{}/{}/_search", self.base_url, index)
    }
}

#[async_trait]
impl SearchBackend for ElasticBackend {
    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        let url = self.search_url(index);
        debug!("requesting url: {url}");

        let mut response: Value = self
            .client
            .post(url)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.get_mut("aggregations").map(Value::take) {
            Some(aggs) if aggs.is_object() => Ok(aggs),
            _ => Err(AgentError::backend("response has no aggregations object")),
        }
    }
}

/// One configured query: index, window and which aggregation set to request.
#[derive(Debug, Clone)]
pub struct WindowedAggregateQuery {
    pub index: String,
    pub window: Duration,
    pub profile: QueryProfile,
}

impl WindowedAggregateQuery {
    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self {
            index: cfg.index.clone(),
            window: cfg.window,
            profile: cfg.profile,
        }
    }

    /// Issues exactly one search; backend failures propagate without retry.
    pub async fn run(&self, backend: &dyn SearchBackend) -> Result<Value> {
        backend.search(&self.index, &self.body()).await
    }

    pub fn body(&self) -> Value {
        let aggs = match self.profile {
            QueryProfile::Full => full_aggregations(),
            QueryProfile::Minimal => minimal_aggregations(),
        };
        json!({
            "size": 0,
            "query": {
                "bool": {
                    "filter": [
                        { "range": { "@timestamp": { "gte": window_expr(self.window) } } }
                    ]
                }
            },
            "aggs": aggs,
        })
    }
}

/// Date-math lower bound, e.g. `now-15m`. Sub-second remainders are dropped.
pub fn window_expr(window: Duration) -> String {
    let secs = window.as_secs().max(1);
    if secs % 3600 == 0 {
        format!("now-{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("now-{}m", secs / 60)
    } else {
        format!("now-{secs}s")
    }
}

fn metric(kind: &str, field: &str) -> Value {
    json!({ kind: { "field": field } })
}

fn full_aggregations() -> Value {
    json!({
        "CPU_gauge_user": metric("avg", "system.cpu.user.pct"),
        "CPU_gauge_sys": metric("avg", "system.cpu.system.pct"),
        "CPU_gauge_core": metric("avg", "system.cpu.cores"),
        "Memory_gauge": metric("avg", "system.memory.actual.used.pct"),
        "Load_5m": metric("avg", "system.load.5"),
        "Swap_usage": metric("avg", "system.memory.swap.used.pct"),
        "Fsstat_used": metric("avg", "system.fsstat.total_size.used"),
        "Fsstat_total": metric("avg", "system.fsstat.total_size.total"),
        "Process": metric("cardinality", "process.pid"),
        "In_pocketloss": metric("max", "system.network.in.dropped"),
        "Out_pocketloss": metric("max", "system.network.out.dropped"),
        "Used_memory": metric("avg", "system.memory.actual.used.bytes"),
        "Total_memory": metric("avg", "system.memory.total"),
        "Top_disk": {
            "terms": {
                "field": "system.filesystem.mount_point.keyword",
                "size": 1,
                "order": { "used_pct": "desc" }
            },
            "aggs": {
                "used_pct": metric("avg", "system.filesystem.used.pct")
            }
        }
    })
}

fn minimal_aggregations() -> Value {
    json!({
        "Latest": {
            "top_hits": {
                "size": 1,
                "sort": [ { "@timestamp": { "order": "desc" } } ],
                "_source": { "includes": ["@timestamp", "host.hostname"] }
            }
        }
    })
}
