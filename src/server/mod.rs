//! HTTP server: shared state, router assembly, and the session layer.

pub mod account;
pub mod api;
pub mod directory;
pub mod extract;
pub mod pagination;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, middleware};
use hub_backend::Backend;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use api::{AppState, SharedState};

/// Configuration for the hub server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            dev_mode: false,
            public_url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

/// Build the full application router with the session cookie layer.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .layer(middleware::from_fn(session::session_cookies))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the hub server and serve until Ctrl+C or SIGTERM.
pub async fn start_server(config: ServerConfig, backend: Backend) -> Result<()> {
    if backend.config().is_placeholder() {
        warn!("backend is not configured; REST calls will fail until BACKEND_URL and BACKEND_ANON_KEY are set");
    }

    let state = Arc::new(AppState::new(backend, config.public_url.clone()));
    let mut app = build_router(state);

    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(%local_addr, public_url = %config.public_url, "hub server listening");
    println!("hubkit running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
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
    info!("shutting down");
}
