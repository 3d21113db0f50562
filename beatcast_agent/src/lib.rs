//! beatcast_agent: rolling metricbeat aggregates, pushed to WebSocket viewers.
//!
//! Pipeline: [`query`] issues one windowed aggregation, [`snapshot`] types
//! it, [`cache`] shares it across everyone asking within a tick, and
//! [`subscription`] drives each viewer's schedule, shaping payloads with
//! [`view`].

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod query;
pub mod snapshot;
pub mod state;
pub mod subscription;
pub mod types;
pub mod view;
pub mod ws;

#[cfg(test)]
mod test_support;

use std::future::Future;

use axum::{routing::get, Router};
use tracing::warn;

pub use error::{AgentError, Result};
pub use state::AppState;

/// Routes: `/ws` push channel, `/metricbeat` pull query.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/metricbeat", get(http::metricbeat_handler))
        .with_state(state)
}

/// Resolves when `signal` fires. If the signal cannot be installed this never
/// resolves, so the server keeps running instead of shutting down at once.
pub async fn shutdown_on<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("shutdown signal unavailable, running until killed: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn failed_signal_does_not_trigger_shutdown() {
        let waiting = tokio::time::timeout(
            Duration::from_secs(3600),
            shutdown_on(async { Err(std::io::Error::other("no signal driver")) }),
        )
        .await;
        assert!(waiting.is_err(), "shutdown resolved on a failed signal");
    }

    #[tokio::test]
    async fn delivered_signal_triggers_shutdown() {
        shutdown_on(async { Ok(()) }).await;
    }
}
