//! `hubkit serve`: run the HTTP server.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use hub_backend::{Backend, CookieOptions, MemoryAuth, MemoryDatastore};
use hubkit::config::{BackendMode, CliOverrides, HubConfig};
use hubkit::seed::{DEMO_EMAIL, DEMO_PASSWORD, seed_demo};
use hubkit::server::{ServerConfig, start_server};
use tracing::info;

pub async fn cmd_serve(config_path: Option<&Path>, overrides: CliOverrides) -> Result<()> {
    let config = HubConfig::resolve(config_path, &overrides)?;
    let backend_config = config.backend_config(|key| std::env::var(key).ok());
    let cookie_options = CookieOptions {
        secure: config.server.secure_cookies,
        ..CookieOptions::default()
    };

    let backend = match config.backend.mode {
        BackendMode::Rest => {
            info!(url = %backend_config.url, "using managed backend");
            Backend::rest(backend_config)
        }
        BackendMode::Memory => {
            let store = Arc::new(MemoryDatastore::new());
            let auth = Arc::new(MemoryAuth::new());
            seed_demo(&store, &auth).await;
            info!("using in-memory backend with demo data");
            println!(
                "In-memory backend: sign in with {} / {}",
                DEMO_EMAIL, DEMO_PASSWORD
            );
            Backend::new(backend_config, auth, store)
        }
    }
    .with_cookie_options(cookie_options);

    start_server(
        ServerConfig {
            host: config.server.host.clone(),
            port: config.server.port,
            dev_mode: config.server.dev,
            public_url: config.public_url(),
        },
        backend,
    )
    .await
}
