//! Per-request cookie jar and the backend client extractors.
//!
//! [`session_cookies`] runs around every handler: it parses the `Cookie`
//! header into a [`RequestCookies`] jar, stores it in the request extensions,
//! and after the handler returns flushes the queued writes as `Set-Cookie`
//! headers. Handlers never touch the jar directly; they take a
//! [`ScopedClient`] (mutable jar) or a [`RenderClient`] (read-only jar).

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};
use hub_backend::{BackendClient, CookieAdapter, CookieContext, RequestCookies, User};
use tracing::warn;

use super::api::SharedState;
use crate::errors::ApiError;

fn jar_from_headers(headers: &HeaderMap, context: CookieContext) -> RequestCookies {
    RequestCookies::from_headers(
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok()),
        context,
    )
}

/// Middleware: attach a mutable cookie jar, then emit its writes.
pub async fn session_cookies(mut req: Request, next: Next) -> Response {
    let jar = Arc::new(jar_from_headers(req.headers(), CookieContext::Mutable));
    req.extensions_mut().insert(Arc::clone(&jar));

    let mut resp = next.run(req).await;

    for value in jar.take_set_cookie_headers() {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                resp.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "dropping unencodable Set-Cookie header"),
        }
    }
    resp
}

/// Backend client bound to the request's mutable cookie jar.
///
/// Falls back to a read-only jar when the middleware is not installed, so
/// extraction itself never fails.
pub struct ScopedClient(pub BackendClient);

impl FromRequestParts<SharedState> for ScopedClient {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let jar = match parts.extensions.get::<Arc<RequestCookies>>() {
            Some(jar) => Arc::clone(jar),
            None => Arc::new(jar_from_headers(&parts.headers, CookieContext::ReadOnly)),
        };
        Ok(ScopedClient(
            state.backend.create_client(CookieAdapter::Methods(jar)),
        ))
    }
}

/// Backend client for render passes: reads the request's cookies but may not
/// write any. Session refreshes during rendering are skipped, not fatal.
pub struct RenderClient(pub BackendClient);

impl FromRequestParts<SharedState> for RenderClient {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let jar = jar_from_headers(&parts.headers, CookieContext::ReadOnly);
        Ok(RenderClient(
            state.backend.create_client(CookieAdapter::methods(jar)),
        ))
    }
}

/// The signed-in user, or `401` before anything else happens.
pub async fn require_user(client: &BackendClient) -> Result<User, ApiError> {
    client.auth().get_user().await?.ok_or(ApiError::Unauthorized)
}
