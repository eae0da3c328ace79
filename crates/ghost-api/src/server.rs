//! Router construction and server lifecycle.

use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
    routing::{any, get},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use ghost_engine::Engine;

use crate::handlers;

/// Builds the router over an engine instance.
///
/// The engine arrives as explicit state; there is no process-wide
/// singleton. `/clone` accepts any method because the inbound method is
/// part of what gets cloned.
pub fn create_router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/clone", any(handlers::handle_clone))
        .route("/status", get(handlers::handle_status))
        .route("/status/{id}", get(handlers::handle_request_status))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Binds `addr` and serves until `shutdown` resolves.
///
/// Bind failures propagate to the caller so the process can exit non-zero.
pub async fn start_server(
    engine: Arc<Engine>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let app = create_router(engine);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    info!(addr = %actual_addr, "HTTP server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}
