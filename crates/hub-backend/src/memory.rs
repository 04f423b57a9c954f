//! In-process stand-ins for the managed backend, used by `hubkit serve
//! --memory` and by tests.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::auth::{AuthApi, build_authorize_url, pkce_challenge};
use crate::error::BackendError;
use crate::query::{Datastore, Operation, Query, QueryResponse, compare};
use crate::session::{Session, User};

/// Lifetime of access tokens issued by [`MemoryAuth`].
pub const TOKEN_TTL_SECS: i64 = 3600;

/// Collections held as JSON rows, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    last_bearer: Mutex<Option<String>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows verbatim, filling `id` / `created_at` when missing.
    pub async fn seed(&self, collection: &str, rows: impl IntoIterator<Item = Value>) {
        let mut collections = self.collections.write().await;
        let table = collections.entry(collection.to_string()).or_default();
        for row in rows {
            if let Value::Object(map) = row {
                table.push(Value::Object(with_defaults(map)));
            }
        }
    }

    /// Snapshot of a collection.
    pub async fn rows(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Bearer token of the most recent query.
    pub fn last_bearer(&self) -> Option<String> {
        self.last_bearer.lock().ok().and_then(|b| b.clone())
    }
}

fn with_defaults(mut map: Map<String, Value>) -> Map<String, Value> {
    map.entry("id")
        .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
    map.entry("created_at")
        .or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));
    map
}

fn project(row: &Value, columns: &str) -> Value {
    let columns = columns.trim();
    if columns.is_empty() || columns == "*" {
        return row.clone();
    }
    let mut out = Map::new();
    for column in columns.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if let Some(v) = row.get(column) {
            out.insert(column.to_string(), v.clone());
        }
    }
    Value::Object(out)
}

fn sort_rows(rows: &mut [Value], query: &Query) {
    if query.order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for order in &query.order {
            let av = a.get(&order.column).unwrap_or(&Value::Null);
            let bv = b.get(&order.column).unwrap_or(&Value::Null);
            // nulls last regardless of direction
            let ord = match (av.is_null(), bv.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                (false, false) => {
                    let ord = compare(av, bv).unwrap_or(Ordering::Equal);
                    if order.ascending { ord } else { ord.reverse() }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn page<T>(items: Vec<T>, query: &Query) -> Vec<T> {
    let offset = query.offset.unwrap_or(0);
    let iter = items.into_iter().skip(offset);
    match query.limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn execute(&self, query: Query, bearer: &str) -> Result<QueryResponse, BackendError> {
        query.validate()?;
        if let Ok(mut last) = self.last_bearer.lock() {
            *last = Some(bearer.to_string());
        }
        let matches = |row: &Value| query.filters.iter().all(|f| f.matches(row));

        let mut collections = self.collections.write().await;
        let table = collections.entry(query.collection.clone()).or_default();

        let (rows, total) = match &query.operation {
            Operation::Select { columns } => {
                let mut found: Vec<Value> = table.iter().filter(|r| matches(*r)).cloned().collect();
                sort_rows(&mut found, &query);
                let total = found.len();
                let rows = page(found, &query)
                    .iter()
                    .map(|r| project(r, columns))
                    .collect();
                (rows, total)
            }
            Operation::Insert { rows } => {
                let mut inserted = Vec::with_capacity(rows.len());
                for row in rows {
                    let Value::Object(map) = row.clone() else {
                        return Err(BackendError::InvalidQuery("insert expects objects".into()));
                    };
                    let row = Value::Object(with_defaults(map));
                    let id = row.get("id").cloned();
                    if table.iter().any(|r| r.get("id") == id.as_ref()) {
                        return Err(BackendError::Remote {
                            status: 409,
                            code: Some("23505".into()),
                            message: format!("duplicate key value in '{}'", query.collection),
                        });
                    }
                    inserted.push(row);
                }
                table.extend(inserted.iter().cloned());
                let total = inserted.len();
                (inserted, total)
            }
            Operation::Update { patch } => {
                let Value::Object(patch) = patch else {
                    return Err(BackendError::InvalidQuery("update expects an object".into()));
                };
                let mut updated = Vec::new();
                for row in table.iter_mut().filter(|r| matches(&**r)) {
                    if let Value::Object(map) = &mut *row {
                        for (k, v) in patch {
                            map.insert(k.clone(), v.clone());
                        }
                    }
                    updated.push(row.clone());
                }
                let total = updated.len();
                (updated, total)
            }
            Operation::Delete => {
                let (removed, kept): (Vec<Value>, Vec<Value>) =
                    std::mem::take(table).into_iter().partition(|r| matches(r));
                *table = kept;
                let total = removed.len();
                (removed, total)
            }
        };

        Ok(QueryResponse {
            rows,
            count: query.count.then_some(total),
        })
    }
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user: User,
}

#[derive(Debug, Clone)]
struct IssuedToken {
    user_id: String,
    expires_at: i64,
}

#[derive(Debug, Default)]
struct AuthState {
    accounts: HashMap<String, Account>,
    access: HashMap<String, IssuedToken>,
    refresh: HashMap<String, String>,
    /// code -> (user id, code challenge)
    codes: HashMap<String, (String, String)>,
}

/// Token-issuing auth service kept in memory.
#[derive(Debug, Default)]
pub struct MemoryAuth {
    state: Mutex<AuthState>,
}

fn unauthorized(message: &str) -> BackendError {
    BackendError::remote(401, message)
}

fn lock_failed() -> BackendError {
    BackendError::remote(500, "auth state lock poisoned")
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) an account and return its user.
    pub fn register(&self, email: &str, password: &str) -> User {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
            user_metadata: Value::Object(Map::new()),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        if let Ok(mut state) = self.state.lock() {
            state.accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    user: user.clone(),
                },
            );
        }
        user
    }

    /// Mint a fresh session for `user`.
    pub fn issue_session(&self, user: &User) -> Session {
        let now = chrono::Utc::now().timestamp();
        let access_token = format!("mem-at-{}", uuid::Uuid::new_v4().simple());
        let refresh_token = format!("mem-rt-{}", uuid::Uuid::new_v4().simple());
        if let Ok(mut state) = self.state.lock() {
            state.access.insert(
                access_token.clone(),
                IssuedToken {
                    user_id: user.id.clone(),
                    expires_at: now + TOKEN_TTL_SECS,
                },
            );
            state.refresh.insert(refresh_token.clone(), user.id.clone());
        }
        Session {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: TOKEN_TTL_SECS,
            expires_at: Some(now + TOKEN_TTL_SECS),
            user: Some(user.clone()),
        }
    }

    /// Authorization code for the PKCE flow, bound to `code_challenge`.
    pub fn issue_code(&self, user: &User, code_challenge: &str) -> String {
        let code = uuid::Uuid::new_v4().simple().to_string();
        if let Ok(mut state) = self.state.lock() {
            state
                .codes
                .insert(code.clone(), (user.id.clone(), code_challenge.to_string()));
        }
        code
    }

    /// Force an access token to be expired.
    pub fn expire(&self, access_token: &str) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(token) = state.access.get_mut(access_token) {
                token.expires_at = 0;
            }
        }
    }

    /// User behind a live access token.
    pub fn get_user_sync(&self, access_token: &str) -> Option<User> {
        let state = self.state.lock().ok()?;
        let token = state.access.get(access_token)?;
        if token.expires_at <= chrono::Utc::now().timestamp() {
            return None;
        }
        state
            .accounts
            .values()
            .find(|a| a.user.id == token.user_id)
            .map(|a| a.user.clone())
    }

    fn user_by_id(&self, user_id: &str) -> Result<User, BackendError> {
        let state = self.state.lock().map_err(|_| lock_failed())?;
        state
            .accounts
            .values()
            .find(|a| a.user.id == user_id)
            .map(|a| a.user.clone())
            .ok_or_else(|| BackendError::remote(404, "user not found"))
    }
}

#[async_trait]
impl AuthApi for MemoryAuth {
    async fn get_user(&self, access_token: &str) -> Result<User, BackendError> {
        self.get_user_sync(access_token)
            .ok_or_else(|| unauthorized("invalid or expired access token"))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let user_id = {
            let mut state = self.state.lock().map_err(|_| lock_failed())?;
            state
                .refresh
                .remove(refresh_token)
                .ok_or_else(|| BackendError::remote(400, "invalid refresh token"))?
        };
        let user = self.user_by_id(&user_id)?;
        Ok(self.issue_session(&user))
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Session, BackendError> {
        let (user_id, challenge) = {
            let mut state = self.state.lock().map_err(|_| lock_failed())?;
            state
                .codes
                .remove(code)
                .ok_or_else(|| BackendError::remote(400, "invalid auth code"))?
        };
        if pkce_challenge(code_verifier) != challenge {
            return Err(BackendError::remote(400, "code verifier does not match"));
        }
        let user = self.user_by_id(&user_id)?;
        Ok(self.issue_session(&user))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let account = {
            let state = self.state.lock().map_err(|_| lock_failed())?;
            state.accounts.get(email).cloned()
        };
        match account {
            Some(account) if account.password == password => Ok(self.issue_session(&account.user)),
            _ => Err(BackendError::remote(400, "invalid login credentials")),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().map_err(|_| lock_failed())?;
        let token = state
            .access
            .remove(access_token)
            .ok_or_else(|| unauthorized("unknown access token"))?;
        state.refresh.retain(|_, user_id| *user_id != token.user_id);
        Ok(())
    }

    fn authorize_url(
        &self,
        provider: &str,
        redirect_to: Option<&str>,
        code_challenge: &str,
    ) -> Result<String, BackendError> {
        build_authorize_url("memory://auth/authorize", provider, redirect_to, code_challenge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, FilterOp, Order};
    use serde_json::json;

    fn select(collection: &str) -> Query {
        Query::new(collection)
    }

    async fn seeded(n: usize) -> MemoryDatastore {
        let store = MemoryDatastore::new();
        store
            .seed(
                "jobs",
                (0..n).map(|i| json!({"id": format!("job-{i:02}"), "n": i, "remote": i % 2 == 0})),
            )
            .await;
        store
    }

    #[tokio::test]
    async fn range_and_count() {
        let store = seeded(45).await;
        let mut q = select("jobs");
        q.offset = Some(20);
        q.limit = Some(20);
        q.count = true;
        q.order.push(Order {
            column: "n".into(),
            ascending: true,
        });
        let resp = store.execute(q, "anon").await.unwrap();
        assert_eq!(resp.rows.len(), 20);
        assert_eq!(resp.count, Some(45));
        assert_eq!(resp.rows[0]["n"], 20);
        assert_eq!(store.last_bearer().as_deref(), Some("anon"));
    }

    #[tokio::test]
    async fn filter_order_and_project() {
        let store = seeded(6).await;
        let mut q = select("jobs");
        q.operation = Operation::Select {
            columns: "id, n".into(),
        };
        q.filters.push(Filter {
            column: "remote".into(),
            op: FilterOp::Eq,
            value: json!(true),
        });
        q.order.push(Order {
            column: "n".into(),
            ascending: false,
        });
        let resp = store.execute(q, "t").await.unwrap();
        let ns: Vec<i64> = resp.rows.iter().map(|r| r["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![4, 2, 0]);
        assert!(resp.rows[0].get("remote").is_none());
        assert_eq!(resp.count, None);
    }

    #[tokio::test]
    async fn insert_update_delete() {
        let store = MemoryDatastore::new();
        let mut insert = select("goals");
        insert.operation = Operation::Insert {
            rows: vec![json!({"title": "walk", "progress": 0})],
        };
        let inserted = store.execute(insert.clone(), "t").await.unwrap();
        let id = inserted.rows[0]["id"].as_str().unwrap().to_string();
        assert!(inserted.rows[0]["created_at"].is_string());

        let mut dup = insert;
        dup.operation = Operation::Insert {
            rows: vec![json!({"id": id, "title": "again"})],
        };
        let err = store.execute(dup, "t").await.unwrap_err();
        assert_eq!(err.status(), Some(409));

        let by_id = Filter {
            column: "id".into(),
            op: FilterOp::Eq,
            value: json!(id),
        };
        let mut update = select("goals");
        update.operation = Operation::Update {
            patch: json!({"progress": 5}),
        };
        update.filters.push(by_id.clone());
        let updated = store.execute(update, "t").await.unwrap();
        assert_eq!(updated.rows[0]["progress"], 5);
        assert_eq!(updated.rows[0]["title"], "walk");

        let mut delete = select("goals");
        delete.operation = Operation::Delete;
        delete.filters.push(by_id);
        assert_eq!(store.execute(delete, "t").await.unwrap().rows.len(), 1);
        assert!(store.rows("goals").await.is_empty());
    }

    #[tokio::test]
    async fn nulls_sort_last() {
        let store = MemoryDatastore::new();
        store
            .seed("t", vec![json!({"k": null}), json!({"k": 2}), json!({"k": 1})])
            .await;
        for ascending in [true, false] {
            let mut q = select("t");
            q.order.push(Order {
                column: "k".into(),
                ascending,
            });
            let rows = store.execute(q, "t").await.unwrap().rows;
            assert!(rows[2]["k"].is_null());
        }
    }

    #[tokio::test]
    async fn auth_tokens_lifecycle() {
        let auth = MemoryAuth::new();
        let user = auth.register("a@example.com", "pw");
        let session = auth.issue_session(&user);
        assert_eq!(auth.get_user(&session.access_token).await.unwrap().id, user.id);

        let refreshed = auth.refresh_session(&session.refresh_token).await.unwrap();
        assert!(auth.refresh_session(&session.refresh_token).await.is_err());

        auth.expire(&refreshed.access_token);
        let err = auth.get_user(&refreshed.access_token).await.unwrap_err();
        assert_eq!(err.status(), Some(401));

        auth.sign_out(&session.access_token).await.unwrap();
        assert!(auth.get_user(&session.access_token).await.is_err());
        assert!(auth.sign_out(&session.access_token).await.unwrap_err().is_client_error());
    }
}
