//! Layered configuration for `hubkit serve`.
//!
//! Values are resolved in order, later layers winning:
//! `hub.toml` → environment (`HUB_*`, `BACKEND_*`) → CLI flags.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//! dev = false
//! public_url = "https://hub.example.com"
//! secure_cookies = true
//!
//! [backend]
//! mode = "rest"            # or "memory"
//! url = "https://abcd.supabase.co"
//! anon_key = "..."
//! ```

use anyhow::{Context, Result};
use hub_backend::BackendConfig;
use hub_backend::config::{ANON_KEY_ENV, URL_ENV};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "hub.toml";

pub const HOST_ENV: &str = "HUB_HOST";
pub const PORT_ENV: &str = "HUB_PORT";
pub const BACKEND_MODE_ENV: &str = "HUB_BACKEND_MODE";
pub const PUBLIC_URL_ENV: &str = "HUB_PUBLIC_URL";

/// Which transports the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// The managed backend over HTTPS
    #[default]
    Rest,
    /// In-process auth and datastore with demo data
    Memory,
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendMode::Rest => write!(f, "rest"),
            BackendMode::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for BackendMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rest" => Ok(BackendMode::Rest),
            "memory" => Ok(BackendMode::Memory),
            _ => anyhow::bail!("Invalid backend mode '{}'. Valid values: rest, memory", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a local frontend dev server
    #[serde(default)]
    pub dev: bool,
    /// Origin used to build OAuth callback URLs. Defaults to `http://host:port`.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Mark session cookies `Secure`
    #[serde(default)]
    pub secure_cookies: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev: false,
            public_url: None,
            secure_cookies: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendSection {
    #[serde(default)]
    pub mode: BackendMode,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
}

/// Contents of `hub.toml` plus whatever the later layers changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub backend: BackendSection,
}

/// CLI-level overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub memory: bool,
    pub dev: bool,
}

impl HubConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse hub.toml")
    }

    /// An explicit path must exist; otherwise `hub.toml` in the working
    /// directory is used when present.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply `HUB_*` environment overrides.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup(HOST_ENV).filter(|v| !v.trim().is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = lookup(PORT_ENV).filter(|v| !v.trim().is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("{} must be a port number, got '{}'", PORT_ENV, port))?;
        }
        if let Some(mode) = lookup(BACKEND_MODE_ENV).filter(|v| !v.trim().is_empty()) {
            self.backend.mode = mode.parse()?;
        }
        if let Some(url) = lookup(PUBLIC_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.server.public_url = Some(url);
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if cli.memory {
            self.backend.mode = BackendMode::Memory;
        }
        if cli.dev {
            self.server.dev = true;
        }
    }

    /// Full resolution: file, then process environment, then CLI.
    pub fn resolve(path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_cli(cli);
        Ok(config)
    }

    /// Backend endpoint and key. `BACKEND_URL` / `BACKEND_ANON_KEY` win over
    /// the file; placeholders fill whatever is still missing.
    pub fn backend_config(&self, lookup: impl Fn(&str) -> Option<String>) -> BackendConfig {
        BackendConfig::from_lookup(|key| {
            lookup(key).filter(|v| !v.trim().is_empty()).or_else(|| {
                if key == URL_ENV {
                    self.backend.url.clone()
                } else if key == ANON_KEY_ENV {
                    self.backend.anon_key.clone()
                } else {
                    None
                }
            })
        })
    }

    /// Origin that browsers reach the server on.
    pub fn public_url(&self) -> String {
        match &self.server.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.server.host, self.server.port),
        }
    }

    /// Serialize back to TOML with the anon key masked.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut copy = self.clone();
        if let Some(key) = copy.backend.anon_key.as_mut() {
            *key = redact(key);
        }
        toml::to_string_pretty(&copy).context("Failed to serialize configuration")
    }
}

/// Keep the first four characters of a secret.
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{}…", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert!(!config.server.dev);
        assert_eq!(config.backend.mode, BackendMode::Rest);
        assert_eq!(config.public_url(), "http://127.0.0.1:3000");
    }

    #[test]
    fn test_parse_partial_file() {
        let config = HubConfig::parse(
            r#"
            [server]
            port = 8080

            [backend]
            mode = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.backend.mode, BackendMode::Memory);
    }

    #[test]
    fn test_parse_rejects_unknown_mode() {
        assert!(HubConfig::parse("[backend]\nmode = \"sqlite\"").is_err());
    }

    #[test]
    fn test_backend_mode_from_str() {
        assert_eq!("REST".parse::<BackendMode>().unwrap(), BackendMode::Rest);
        assert_eq!("memory".parse::<BackendMode>().unwrap(), BackendMode::Memory);
        assert!("postgres".parse::<BackendMode>().is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = HubConfig::parse("[server]\nport = 8080\nhost = \"0.0.0.0\"").unwrap();
        config
            .apply_env(env(&[(PORT_ENV, "9000"), (BACKEND_MODE_ENV, "memory")]))
            .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.backend.mode, BackendMode::Memory);
    }

    #[test]
    fn test_env_bad_port_is_an_error() {
        let mut config = HubConfig::default();
        let err = config.apply_env(env(&[(PORT_ENV, "eighty")])).unwrap_err();
        assert!(err.to_string().contains(PORT_ENV));
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = HubConfig::default();
        config.apply_env(env(&[(PORT_ENV, "9000")])).unwrap();
        config.apply_cli(&CliOverrides {
            port: Some(4000),
            memory: true,
            ..Default::default()
        });
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.backend.mode, BackendMode::Memory);
    }

    #[test]
    fn test_backend_config_layers() {
        let config = HubConfig::parse(
            "[backend]\nurl = \"https://filed.supabase.co\"\nanon_key = \"file-key\"",
        )
        .unwrap();

        let from_file = config.backend_config(env(&[]));
        assert_eq!(from_file.url, "https://filed.supabase.co");
        assert_eq!(from_file.anon_key, "file-key");

        let from_env = config.backend_config(env(&[(URL_ENV, "https://env.supabase.co")]));
        assert_eq!(from_env.url, "https://env.supabase.co");
        assert_eq!(from_env.anon_key, "file-key");

        let fallback = HubConfig::default().backend_config(env(&[]));
        assert!(fallback.is_placeholder());
    }

    #[test]
    fn test_public_url_trims_slash() {
        let mut config = HubConfig::default();
        config.server.public_url = Some("https://hub.example.com/".into());
        assert_eq!(config.public_url(), "https://hub.example.com");
    }

    #[test]
    fn test_redacted_toml_masks_key() {
        let mut config = HubConfig::default();
        config.backend.anon_key = Some("eyJhbGciOiJIUzI1NiJ9.secret".into());
        let out = config.to_redacted_toml().unwrap();
        assert!(out.contains("eyJh…"));
        assert!(!out.contains("secret"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let err = HubConfig::load_or_default(Some(Path::new("/nonexistent/hub.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
