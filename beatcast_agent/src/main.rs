//! beatcast_agent entry: parse config, init logging, serve push + pull routes.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use beatcast_agent::{
    config::{parse_args, Command, USAGE},
    query::ElasticBackend,
    router, shutdown_on, AppState,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = match parse_args(std::env::args(), |k| std::env::var(k).ok())? {
        Command::Help => {
            println!("{USAGE}");
            return Ok(());
        }
        Command::Run(cfg) => cfg,
    };

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let backend = ElasticBackend::from_config(&cfg)?;
    let state = AppState::new(&cfg, Arc::new(backend));
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        backend = %cfg.backend_url,
        index = %cfg.index,
        window = ?cfg.window,
        interval = ?cfg.interval,
        profile = ?cfg.profile,
        "beatcast agent listening on http://{}",
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on(tokio::signal::ctrl_c()))
        .await?;
    Ok(())
}
