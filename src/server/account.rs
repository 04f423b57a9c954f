//! Sign-in, sign-out, and the current user.

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use anyhow::Context;
use hub_backend::Url;
use serde::Deserialize;
use tracing::{info, warn};

use super::api::SharedState;
use super::extract::{ApiJson, ApiQuery};
use super::session::{ScopedClient, require_user};
use crate::errors::ApiError;

pub const DEFAULT_PROVIDER: &str = "github";

#[derive(Deserialize)]
pub struct LoginQuery {
    pub provider: Option<String>,
    pub next: Option<String>,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub next: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Deserialize)]
pub struct PasswordRequest {
    pub email: String,
    pub password: String,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/password", post(password_sign_in))
        .route("/auth/signout", post(sign_out))
        .route("/api/me", get(current_user))
}

/// Only same-site absolute paths are honored as post-login targets.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/",
    }
}

/// `{public_url}/auth/callback?next=...` with `next` form-encoded.
pub fn callback_url(public_url: &str, next: &str) -> Result<String, ApiError> {
    let base = format!("{}/auth/callback", public_url.trim_end_matches('/'));
    let mut url =
        Url::parse(&base).with_context(|| format!("invalid public URL '{}'", public_url))?;
    url.query_pairs_mut().append_pair("next", next);
    Ok(url.into())
}

async fn login(
    State(state): State<SharedState>,
    ScopedClient(client): ScopedClient,
    ApiQuery(params): ApiQuery<LoginQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let provider = params.provider.as_deref().unwrap_or(DEFAULT_PROVIDER);
    let next = safe_next(params.next.as_deref());
    let callback = callback_url(&state.public_url, next)?;

    let redirect = client.auth().sign_in_with_oauth(provider, Some(&callback))?;
    if !redirect.verifier_stored {
        warn!(provider = %redirect.provider, "code verifier cookie not stored, callback will fail");
    }
    info!(provider = %redirect.provider, "starting OAuth sign-in");
    Ok(Redirect::to(&redirect.url))
}

async fn callback(
    ScopedClient(client): ScopedClient,
    ApiQuery(params): ApiQuery<CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(error) = params.error {
        let detail = params.error_description.unwrap_or(error);
        return Err(ApiError::bad_request(format!("Sign-in failed: {}", detail)));
    }
    let code = params
        .code
        .ok_or_else(|| ApiError::bad_request("Missing auth code"))?;

    let session = client.auth().exchange_code_for_session(&code).await?;
    info!(
        user_id = session.user.as_ref().map(|u| u.id.as_str()).unwrap_or("unknown"),
        "OAuth sign-in complete"
    );
    Ok(Redirect::to(safe_next(params.next.as_deref())))
}

async fn password_sign_in(
    ScopedClient(client): ScopedClient,
    ApiJson(req): ApiJson<PasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = match client
        .auth()
        .sign_in_with_password(&req.email, &req.password)
        .await
    {
        Ok(session) => session,
        Err(e) if e.is_client_error() => {
            return Err(ApiError::bad_request("Invalid login credentials"));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Json(serde_json::json!({ "user": session.user })))
}

async fn sign_out(ScopedClient(client): ScopedClient) -> Result<impl IntoResponse, ApiError> {
    client.auth().sign_out().await?;
    Ok(Json(serde_json::json!({ "status": "signed_out" })))
}

async fn current_user(ScopedClient(client): ScopedClient) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    Ok(Json(user))
}
