use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::{Auth, AuthApi};
use crate::config::BackendConfig;
use crate::cookies::{Cookie, CookieAdapter, CookieOptions, CookieWrite, SessionCookies};
use crate::error::BackendError;
use crate::memory::{MemoryAuth, MemoryDatastore};
use crate::query::{Datastore, QueryBuilder};
use crate::rest::{RestAuth, RestDatastore};
use crate::session::{Session, chunk_cookies, encode_session, present_cookie_names};

/// Process-wide backend wiring: configuration plus the shared transports.
///
/// Cheap to clone. Holds no per-request state; use
/// [`create_client`](Self::create_client) for each request.
#[derive(Clone)]
pub struct Backend {
    config: Arc<BackendConfig>,
    auth: Arc<dyn AuthApi>,
    store: Arc<dyn Datastore>,
    cookie_options: CookieOptions,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("url", &self.config.url)
            .field("cookie_options", &self.cookie_options)
            .finish_non_exhaustive()
    }
}

impl Backend {
    pub fn new(config: BackendConfig, auth: Arc<dyn AuthApi>, store: Arc<dyn Datastore>) -> Self {
        Self {
            config: Arc::new(config),
            auth,
            store,
            cookie_options: CookieOptions::default(),
        }
    }

    /// Talk to the managed backend over HTTPS.
    pub fn rest(config: BackendConfig) -> Self {
        let http = reqwest::Client::new();
        let auth = Arc::new(RestAuth::new(http.clone(), &config));
        let store = Arc::new(RestDatastore::new(http, &config));
        Self::new(config, auth, store)
    }

    /// In-process auth and storage, for local development and tests.
    pub fn in_memory(config: BackendConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemoryAuth::new()),
            Arc::new(MemoryDatastore::new()),
        )
    }

    pub fn with_cookie_options(mut self, options: CookieOptions) -> Self {
        self.cookie_options = options;
        self
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn auth_api(&self) -> &dyn AuthApi {
        self.auth.as_ref()
    }

    pub fn store(&self) -> &dyn Datastore {
        self.store.as_ref()
    }

    pub fn create_client(&self, cookies: CookieAdapter) -> BackendClient {
        create_client(self, cookies)
    }
}

/// Build a client handle bound to one request's cookies.
///
/// Never fails and never touches the network; session refresh happens
/// lazily in [`Auth::get_session`]. The handle must not outlive the request.
pub fn create_client(backend: &Backend, cookies: CookieAdapter) -> BackendClient {
    BackendClient {
        session_cookie_name: backend.config.session_cookie_name(),
        backend: backend.clone(),
        cookies: SessionCookies::new(cookies),
    }
}

/// Per-request handle: auth plus collection queries.
pub struct BackendClient {
    backend: Backend,
    cookies: SessionCookies,
    session_cookie_name: String,
}

impl fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendClient")
            .field("url", &self.backend.config.url)
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    pub fn auth(&self) -> Auth<'_> {
        Auth::new(self)
    }

    /// Start a query on `collection`.
    pub fn from(&self, collection: &str) -> QueryBuilder<'_> {
        QueryBuilder::new(self, collection)
    }

    pub fn url(&self) -> &str {
        &self.backend.config.url
    }

    pub fn anon_key(&self) -> &str {
        &self.backend.config.anon_key
    }

    pub fn cookies(&self) -> &SessionCookies {
        &self.cookies
    }

    pub fn session_cookie_name(&self) -> &str {
        &self.session_cookie_name
    }

    pub(crate) fn backend(&self) -> &Backend {
        &self.backend
    }

    pub(crate) fn cookie_options(&self) -> &CookieOptions {
        &self.backend.cookie_options
    }

    /// Token for data requests: the session's access token, else the anon key.
    pub(crate) async fn bearer_token(&self) -> Result<String, BackendError> {
        Ok(match self.auth().get_session().await? {
            Some(session) => session.access_token,
            None => self.backend.config.anon_key.clone(),
        })
    }

    /// Write `session` into the cookies, replacing any previous chunks.
    pub(crate) fn store_session(&self, session: &Session) -> Vec<CookieWrite> {
        let value = match encode_session(session) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to encode session, not storing it");
                return Vec::new();
            }
        };
        let name = &self.session_cookie_name;
        let options = self.cookie_options();
        let mut cookies = chunk_cookies(name, &value, options);
        for stale in present_cookie_names(&self.cookies, name) {
            if !cookies.iter().any(|c| c.name == stale) {
                cookies.push(Cookie::removal(stale, options));
            }
        }
        let writes = self.cookies.set_all(cookies);
        log_skipped("store session", &writes);
        writes
    }

    /// Remove every session cookie chunk.
    pub(crate) fn clear_session(&self) -> Vec<CookieWrite> {
        let options = self.cookie_options();
        let removals: Vec<Cookie> = present_cookie_names(&self.cookies, &self.session_cookie_name)
            .into_iter()
            .map(|name| Cookie::removal(name, options))
            .collect();
        let writes = self.cookies.set_all(removals);
        log_skipped("clear session", &writes);
        writes
    }
}

fn log_skipped(action: &str, writes: &[CookieWrite]) {
    let skipped = writes.iter().filter(|w| !w.is_applied()).count();
    if skipped > 0 {
        debug!(action, skipped, "session cookies not refreshed in this context");
    }
}
