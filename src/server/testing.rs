//! Router test harness: in-memory backend with a datastore that counts calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use http_body_util::BodyExt;
use hub_backend::session::encode_session;
use hub_backend::{
    Backend, BackendConfig, BackendError, Datastore, MemoryAuth, MemoryDatastore, Query,
    QueryResponse, User,
    query::{Filter, FilterOp, Operation},
};
use serde_json::Value;
use tower::ServiceExt;

use super::{AppState, build_router};

/// Wraps [`MemoryDatastore`] and counts every query that reaches it.
///
/// Queries queued with [`interleave_before_update`](Self::interleave_before_update)
/// run just ahead of the next update on the same collection, standing in for
/// a concurrent request that wins the race.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryDatastore,
    calls: AtomicUsize,
    interleaved: Mutex<VecDeque<Query>>,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn seed(&self, collection: &str, rows: impl IntoIterator<Item = Value>) {
        self.inner.seed(collection, rows).await;
    }

    pub async fn rows(&self, collection: &str) -> Vec<Value> {
        self.inner.rows(collection).await
    }

    pub fn interleave_before_update(&self, query: Query) {
        self.interleaved.lock().unwrap().push_back(query);
    }

    fn take_interleaved(&self, query: &Query) -> Option<Query> {
        if !matches!(query.operation, Operation::Update { .. }) {
            return None;
        }
        let mut queue = self.interleaved.lock().unwrap();
        match queue.front() {
            Some(next) if next.collection == query.collection => queue.pop_front(),
            _ => None,
        }
    }
}

#[async_trait]
impl Datastore for CountingStore {
    async fn execute(&self, query: Query, bearer: &str) -> Result<QueryResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(first) = self.take_interleaved(&query) {
            self.inner.execute(first, bearer).await?;
        }
        self.inner.execute(query, bearer).await
    }
}

pub struct TestApp {
    pub backend: Backend,
    pub auth: Arc<MemoryAuth>,
    pub store: Arc<CountingStore>,
}

impl TestApp {
    pub fn new() -> Self {
        let auth = Arc::new(MemoryAuth::new());
        let store = Arc::new(CountingStore::default());
        let backend = Backend::new(
            BackendConfig::new("https://hubtest.supabase.co", "test-anon-key"),
            auth.clone(),
            store.clone(),
        );
        Self {
            backend,
            auth,
            store,
        }
    }

    pub fn router(&self) -> Router {
        build_router(Arc::new(AppState::new(
            self.backend.clone(),
            "http://hub.test",
        )))
    }

    pub fn cookie_name(&self) -> String {
        self.backend.config().session_cookie_name()
    }

    /// Register `email` and return the user plus a `Cookie` header value
    /// carrying a live session.
    pub fn sign_in(&self, email: &str) -> (User, String) {
        let user = self.auth.register(email, "correct horse");
        let session = self.auth.issue_session(&user);
        let cookie = format!(
            "{}={}",
            self.cookie_name(),
            encode_session(&session).unwrap()
        );
        (user, cookie)
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let resp = self.send(method, uri, cookie, body).await;
        let status = resp.status();
        (status, body_json(resp).await)
    }

    /// Send `body` verbatim as an `application/json` request.
    pub async fn call_raw(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: &str,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let resp = self
            .router()
            .oneshot(req.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        (status, body_json(resp).await)
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        self.router().oneshot(req).await.unwrap()
    }
}

/// An update of row `id` in `collection`, for
/// [`CountingStore::interleave_before_update`].
pub fn update_by_id(collection: &str, id: &str, patch: Value) -> Query {
    let mut query = Query::new(collection);
    query.operation = Operation::Update { patch };
    query.filters.push(Filter {
        column: "id".into(),
        op: FilterOp::Eq,
        value: Value::from(id),
    });
    query
}

/// Response body as JSON; `Null` for empty or non-JSON bodies.
pub async fn body_json(resp: Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
