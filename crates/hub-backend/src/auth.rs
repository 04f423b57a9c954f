use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::Url;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::client::BackendClient;
use crate::cookies::Cookie;
use crate::error::BackendError;
use crate::session::{Session, User, decode_session, read_chunked};

/// Refresh the access token when it expires within this many seconds.
pub const EXPIRY_MARGIN_SECS: i64 = 10;

/// The auth half of the managed backend.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn get_user(&self, access_token: &str) -> Result<User, BackendError>;
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError>;
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Session, BackendError>;
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;
    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;
    fn authorize_url(
        &self,
        provider: &str,
        redirect_to: Option<&str>,
        code_challenge: &str,
    ) -> Result<String, BackendError>;
}

/// Where to send the browser to start an OAuth sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OAuthRedirect {
    pub provider: String,
    pub url: String,
    /// False when the code verifier cookie could not be written; the
    /// callback will then fail to exchange the code.
    pub verifier_stored: bool,
}

/// Auth operations bound to one client handle; see [`BackendClient::auth`].
pub struct Auth<'a> {
    client: &'a BackendClient,
}

impl<'a> Auth<'a> {
    pub(crate) fn new(client: &'a BackendClient) -> Self {
        Self { client }
    }

    fn api(&self) -> &dyn AuthApi {
        self.client.backend().auth_api()
    }

    fn verifier_cookie_name(&self) -> String {
        format!("{}-code-verifier", self.client.session_cookie_name())
    }

    /// Session stored in the request cookies, without contacting the backend.
    pub fn stored_session(&self) -> Option<Session> {
        let raw = read_chunked(self.client.cookies(), self.client.session_cookie_name())?;
        let session = decode_session(&raw);
        if session.is_none() {
            debug!("ignoring unreadable session cookie");
        }
        session
    }

    /// Current session, refreshed and re-stored when the access token is
    /// about to expire. No session is `Ok(None)`.
    pub async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(session) = self.stored_session() else {
            return Ok(None);
        };
        let now = chrono::Utc::now().timestamp();
        if !session.expires_within(now, EXPIRY_MARGIN_SECS) {
            return Ok(Some(session));
        }

        debug!("access token expiring, refreshing session");
        match self.api().refresh_session(&session.refresh_token).await {
            Ok(fresh) => {
                let fresh = fresh.normalized(now);
                self.client.store_session(&fresh);
                Ok(Some(fresh))
            }
            Err(e) if e.is_client_error() => {
                warn!(error = %e, "session refresh rejected, clearing session");
                self.client.clear_session();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// The signed-in user as confirmed by the auth service. A missing or
    /// rejected session is `Ok(None)`.
    pub async fn get_user(&self) -> Result<Option<User>, BackendError> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };
        match self.api().get_user(&session.access_token).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.is_client_error() => {
                debug!(error = %e, "access token rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Start a PKCE OAuth flow: stores the code verifier cookie and returns
    /// the provider URL.
    pub fn sign_in_with_oauth(
        &self,
        provider: &str,
        redirect_to: Option<&str>,
    ) -> Result<OAuthRedirect, BackendError> {
        let provider = provider.trim();
        if provider.is_empty()
            || !provider
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(BackendError::InvalidRequest(format!(
                "invalid OAuth provider '{provider}'"
            )));
        }
        let verifier = pkce_verifier();
        let challenge = pkce_challenge(&verifier);
        let write = self.client.cookies().set(Cookie::new(
            self.verifier_cookie_name(),
            verifier,
            self.client.cookie_options().clone(),
        ));
        Ok(OAuthRedirect {
            provider: provider.to_string(),
            url: self.api().authorize_url(provider, redirect_to, &challenge)?,
            verifier_stored: write.is_applied(),
        })
    }

    /// Finish the OAuth flow started by [`sign_in_with_oauth`](Self::sign_in_with_oauth).
    pub async fn exchange_code_for_session(&self, code: &str) -> Result<Session, BackendError> {
        if code.trim().is_empty() {
            return Err(BackendError::InvalidRequest("missing auth code".into()));
        }
        let verifier_name = self.verifier_cookie_name();
        let verifier = self
            .client
            .cookies()
            .get(&verifier_name)
            .ok_or_else(|| BackendError::InvalidRequest("missing PKCE code verifier".into()))?;
        let session = self
            .api()
            .exchange_code(code.trim(), &verifier)
            .await?
            .normalized(chrono::Utc::now().timestamp());
        self.client
            .cookies()
            .remove(&verifier_name, self.client.cookie_options());
        self.client.store_session(&session);
        Ok(session)
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(BackendError::InvalidRequest(
                "email and password are required".into(),
            ));
        }
        let session = self
            .api()
            .sign_in_with_password(email.trim(), password)
            .await?
            .normalized(chrono::Utc::now().timestamp());
        self.client.store_session(&session);
        Ok(session)
    }

    /// Revoke the session remotely (best effort) and drop the cookies.
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(session) = self.stored_session() {
            match self.api().sign_out(&session.access_token).await {
                Ok(()) => {}
                Err(e) if e.is_client_error() => debug!(error = %e, "session already gone"),
                Err(e) => warn!(error = %e, "remote sign-out failed, clearing cookies anyway"),
            }
        }
        self.client.clear_session();
        Ok(())
    }
}

/// 64 characters from the RFC 7636 unreserved set.
pub fn pkce_verifier() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// S256 code challenge for `verifier`.
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// `endpoint` with the provider and PKCE parameters appended as a form-encoded
/// query.
pub fn build_authorize_url(
    endpoint: &str,
    provider: &str,
    redirect_to: Option<&str>,
    code_challenge: &str,
) -> Result<String, BackendError> {
    let mut url = Url::parse(endpoint).map_err(|e| {
        BackendError::InvalidRequest(format!("invalid authorize endpoint '{endpoint}': {e}"))
    })?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("provider", provider)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "s256");
        if let Some(redirect_to) = redirect_to {
            query.append_pair("redirect_to", redirect_to);
        }
    }
    Ok(url.into())
}
