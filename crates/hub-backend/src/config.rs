use serde::{Deserialize, Serialize};
use tracing::warn;

pub const URL_ENV: &str = "BACKEND_URL";
pub const ANON_KEY_ENV: &str = "BACKEND_ANON_KEY";

/// Used when no backend URL is configured (local builds, tests). Nothing
/// answers at this address.
pub const PLACEHOLDER_URL: &str = "https://placeholder.supabase.co";
pub const PLACEHOLDER_ANON_KEY: &str = "placeholder-anon-key";

/// Endpoint and public access key of the managed backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: PLACEHOLDER_URL.to_string(),
            anon_key: PLACEHOLDER_ANON_KEY.to_string(),
        }
    }
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
        }
    }

    /// Read `BACKEND_URL` / `BACKEND_ANON_KEY`, falling back to the
    /// placeholders. Never fails.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str, fallback: &str| match lookup(key).filter(|v| !v.trim().is_empty()) {
            Some(v) => v.trim().to_string(),
            None => {
                warn!("{key} not set, using placeholder value");
                fallback.to_string()
            }
        };
        Self {
            url: read(URL_ENV, PLACEHOLDER_URL),
            anon_key: read(ANON_KEY_ENV, PLACEHOLDER_ANON_KEY),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.url == PLACEHOLDER_URL || self.anon_key == PLACEHOLDER_ANON_KEY
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// First DNS label of the endpoint host (`abcd` for `https://abcd.supabase.co`).
    pub fn project_ref(&self) -> String {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        let host = rest.split(['/', ':', '?']).next().unwrap_or_default();
        let label = host.split('.').next().unwrap_or_default();
        if label.is_empty() {
            "local".to_string()
        } else {
            label.to_string()
        }
    }

    /// Name of the cookie holding the serialized session.
    pub fn session_cookie_name(&self) -> String {
        format!("sb-{}-auth-token", self.project_ref())
    }

    /// Copy with the anon key masked, for printing.
    pub fn redacted(&self) -> Self {
        let visible: String = self.anon_key.chars().take(4).collect();
        Self {
            url: self.url.clone(),
            anon_key: format!("{visible}…"),
        }
    }
}
