//! HTTPS transports for the managed backend: a PostgREST-shaped data API
//! under `/rest/v1` and a GoTrue-shaped auth API under `/auth/v1`.

use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, HeaderMap};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::auth::{AuthApi, build_authorize_url};
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::query::{Datastore, Operation, Query, QueryResponse};
use crate::session::{Session, User};

/// Error body shapes returned by the data and auth APIs.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<Value>,
    message: Option<String>,
    msg: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn remote_error(resp: Response) -> BackendError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let message = body
        .message
        .or(body.msg)
        .or(body.error_description)
        .or(body.error)
        .unwrap_or_else(|| {
            if text.is_empty() {
                format!("HTTP {status}")
            } else {
                text.clone()
            }
        });
    let code = body.code.map(|c| match c {
        Value::String(s) => s,
        other => other.to_string(),
    });
    BackendError::Remote {
        status,
        code,
        message,
    }
}

/// Parse the total out of a `Content-Range` header (`0-19/45`, `*/45`).
pub fn parse_content_range(value: &str) -> Option<usize> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn content_range_total(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
}

/// Method, query-string and `Prefer` header for a query.
pub fn request_parts(query: &Query) -> (Method, Vec<(String, String)>, Option<String>) {
    let mut params: Vec<(String, String)> = Vec::new();
    let mut prefer: Vec<&str> = Vec::new();

    let method = match &query.operation {
        Operation::Select { columns } => {
            params.push(("select".into(), columns.clone()));
            Method::GET
        }
        Operation::Insert { .. } => {
            prefer.push("return=representation");
            Method::POST
        }
        Operation::Update { .. } => {
            prefer.push("return=representation");
            Method::PATCH
        }
        Operation::Delete => {
            prefer.push("return=representation");
            Method::DELETE
        }
    };
    if query.count {
        prefer.push("count=exact");
    }

    params.extend(query.filters.iter().map(|f| f.to_param()));
    if !query.order.is_empty() {
        let order: Vec<String> = query
            .order
            .iter()
            .map(|o| {
                format!(
                    "{}.{}",
                    o.column,
                    if o.ascending { "asc" } else { "desc" }
                )
            })
            .collect();
        params.push(("order".into(), order.join(",")));
    }
    if let Some(offset) = query.offset {
        params.push(("offset".into(), offset.to_string()));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".into(), limit.to_string()));
    }

    let prefer = (!prefer.is_empty()).then(|| prefer.join(","));
    (method, params, prefer)
}

/// Collection queries over the `/rest/v1` API.
#[derive(Debug, Clone)]
pub struct RestDatastore {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl RestDatastore {
    pub fn new(http: reqwest::Client, config: &BackendConfig) -> Self {
        Self {
            http,
            base_url: config.base_url().to_string(),
            anon_key: config.anon_key.clone(),
        }
    }
}

#[async_trait]
impl Datastore for RestDatastore {
    async fn execute(&self, query: Query, bearer: &str) -> Result<QueryResponse, BackendError> {
        query.validate()?;
        let (method, params, prefer) = request_parts(&query);
        let url = format!("{}/rest/v1/{}", self.base_url, query.collection);
        debug!(collection = %query.collection, operation = query.operation.name(), "data request");

        let mut req = self
            .http
            .request(method, &url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .query(&params);
        if let Some(prefer) = prefer {
            req = req.header("Prefer", prefer);
        }
        req = match &query.operation {
            Operation::Insert { rows } => req.json(rows),
            Operation::Update { patch } => req.json(patch),
            _ => req,
        };

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(remote_error(resp).await);
        }
        let count = if query.count {
            content_range_total(resp.headers())
        } else {
            None
        };
        let text = resp.text().await?;
        let rows = match text.trim() {
            "" => Vec::new(),
            body => match serde_json::from_str::<Value>(body)? {
                Value::Array(rows) => rows,
                Value::Null => Vec::new(),
                row => vec![row],
            },
        };
        Ok(QueryResponse { rows, count })
    }
}

/// Auth calls over the `/auth/v1` API.
#[derive(Debug, Clone)]
pub struct RestAuth {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl RestAuth {
    pub fn new(http: reqwest::Client, config: &BackendConfig) -> Self {
        Self {
            http,
            base_url: config.base_url().to_string(),
            anon_key: config.anon_key.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/auth/v1/{}", self.base_url, path))
            .header("apikey", &self.anon_key)
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<Session, BackendError> {
        let resp = self
            .request(Method::POST, "token")
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(remote_error(resp).await);
        }
        Ok(resp.json::<Session>().await?)
    }
}

#[async_trait]
impl AuthApi for RestAuth {
    async fn get_user(&self, access_token: &str) -> Result<User, BackendError> {
        let resp = self
            .request(Method::GET, "user")
            .bearer_auth(access_token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(remote_error(resp).await);
        }
        Ok(resp.json::<User>().await?)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Session, BackendError> {
        self.token_grant(
            "pkce",
            json!({ "auth_code": code, "code_verifier": code_verifier }),
        )
        .await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.token_grant("password", json!({ "email": email, "password": password }))
            .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let resp = self
            .request(Method::POST, "logout")
            .bearer_auth(access_token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(remote_error(resp).await);
        }
        Ok(())
    }

    fn authorize_url(
        &self,
        provider: &str,
        redirect_to: Option<&str>,
        code_challenge: &str,
    ) -> Result<String, BackendError> {
        build_authorize_url(
            &format!("{}/auth/v1/authorize", self.base_url),
            provider,
            redirect_to,
            code_challenge,
        )
    }
}
