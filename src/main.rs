//! Ghost deferred HTTP dispatcher.
//!
//! Main entry point: parses flags, starts the engine and the HTTP server,
//! and coordinates graceful shutdown with a snapshot of the pending set.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use ghost_engine::{Engine, EngineConfig};

/// Deferred HTTP dispatcher: accept a request now, replay it against its
/// target later, and optionally report the outcome to a callback URL.
#[derive(Debug, Parser)]
#[command(name = "ghost", version)]
struct Args {
    /// Port the HTTP server listens on.
    #[arg(long, default_value_t = 8112)]
    port: u16,

    /// Maximum capacity of the unprocessed request queue.
    #[arg(long, default_value_t = ghost_engine::DEFAULT_QUEUE_CAPACITY)]
    capacity: usize,

    /// Maximum number of concurrently active outbound requests.
    #[arg(long, default_value_t = ghost_engine::DEFAULT_DISPATCH_CAPACITY)]
    active: usize,

    /// Maximum number of concurrently active notification requests.
    #[arg(long = "active-notifications", default_value_t = ghost_engine::DEFAULT_NOTIFY_CAPACITY)]
    active_notifications: usize,

    /// Replay the ghostdb snapshot on startup, if present.
    #[arg(long)]
    load: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    info!("starting ghost deferred dispatcher");

    let config = EngineConfig {
        queue_capacity: args.capacity,
        dispatch_capacity: args.active,
        notify_capacity: args.active_notifications,
        ..EngineConfig::default()
    };

    let engine = Arc::new(Engine::new(config)?);
    engine.start();

    if args.load {
        match engine.load().await {
            Ok(count) => info!(count, "replayed snapshot"),
            Err(e) => error!(error = %e, "failed to load snapshot, continuing without recovery"),
        }
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!(%addr, "ghost is ready to clone requests");

    ghost_api::start_server(engine.clone(), addr, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Server stopped; halt the engine and persist whatever is still pending.
    engine.shutdown().await.context("engine shutdown failed")?;

    info!("ghost shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,ghost=debug"))
        .expect("Invalid RUST_LOG environment variable");

    tracing_subscriber::registry().with(filter).with(fmt::layer().with_target(true)).init();
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
