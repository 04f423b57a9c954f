use std::sync::Arc;

use axum::{Router, routing::get};
use hub_backend::Backend;

use super::{account, directory};
use crate::apps;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub backend: Backend,
    /// Origin browsers use to reach this server, for OAuth callbacks.
    pub public_url: String,
}

impl AppState {
    pub fn new(backend: Backend, public_url: impl Into<String>) -> Self {
        Self {
            backend,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .merge(directory::router())
        .merge(account::router())
        .merge(apps::webtoon::router())
        .merge(apps::orders::router())
        .merge(apps::mentor::router())
        .merge(apps::jobs::router())
        .merge(apps::remind::router())
        .merge(apps::recommend::router())
}

async fn health_check() -> &'static str {
    "ok"
}
