//! MessageHive gateway binary.
//!
//! - Load + validate config, apply CLI overrides
//! - Open the group store and bulk-load persisted groups
//! - Start dispatcher / event / transient loops, then serve `/v1/ws`
//! - Ctrl-C or SIGTERM stops everything immediately (nothing is drained)

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use messagehive_gateway::cli::{Args, Command};
use messagehive_gateway::store::SqliteGroupStore;
use messagehive_gateway::workers::MemoryTransientStore;
use messagehive_gateway::{app_state, config, router};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("messagehive: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut cfg = config::load_from_file(&args.config)?;
    args.apply_overrides(&mut cfg);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log.level));
    fmt().with_env_filter(filter).init();
    tracing::info!(config = %args.config, "using config file");

    if !matches!(args.command, Some(Command::Server { .. })) {
        tracing::info!("no command specified, use `messagehive server` to start the gateway");
        return Ok(());
    }

    let listen: SocketAddr = cfg.listen_addr().parse()?;

    let group_store = Arc::new(SqliteGroupStore::open(&cfg.store.path)?);
    let transient_store = Arc::new(MemoryTransientStore::new());

    let (state, workers) = app_state::AppState::new(cfg, group_store, transient_store);
    state.directory().load_from_store().await?;
    let _loops = workers.spawn();

    let app = router::build_router(state);

    tracing::info!(%listen, "messagehive starting");
    let listener = tokio::net::TcpListener::bind(listen).await?;

    tokio::select! {
        res = axum::serve(listener, app) => res?,
        _ = shutdown_signal() => tracing::info!("shutdown signal received, exiting"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
