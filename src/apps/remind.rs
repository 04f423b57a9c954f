//! Goals with reminders, walks logged against them, and web-push
//! subscriptions. Delivering the reminders is left to the push service;
//! this module only records what to deliver and where.

use axum::{
    Json, Router,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, SecondsFormat, Utc};
use hub_backend::{BackendClient, User};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{find_one, insert_one, required_text};
use crate::errors::ApiError;
use crate::server::SharedState;
use crate::server::extract::ApiJson;
use crate::server::session::{ScopedClient, require_user};

pub const GOALS: &str = "goals";
pub const WALKS: &str = "walks";
pub const PUSH_SUBSCRIPTIONS: &str = "push_subscriptions";

pub const MAX_TITLE: usize = 100;
pub const MAX_WALK_KM: f64 = 1000.0;
pub const MAX_WALK_MINUTES: u32 = 24 * 60;
/// Compare-and-set attempts when logging a walk before answering 409.
pub const PROGRESS_ATTEMPTS: usize = 3;
pub const MAX_ENDPOINT: usize = 2048;
pub const MAX_PUSH_KEY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub target: f64,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub remind_at: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Walk {
    pub id: String,
    pub goal_id: String,
    pub user_id: String,
    pub distance_km: f64,
    pub minutes: u32,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: String,
    pub user_id: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateGoalRequest {
    pub title: String,
    pub target: f64,
    pub remind_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateGoalRequest {
    pub title: Option<String>,
    pub target: Option<f64>,
    pub remind_at: Option<String>,
    pub done: Option<bool>,
}

#[derive(Deserialize)]
pub struct LogWalkRequest {
    pub distance_km: f64,
    pub minutes: u32,
}

#[derive(Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: PushKeys,
}

#[derive(Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/goals", get(list_goals).post(create_goal))
        .route(
            "/api/goals/{id}",
            get(get_goal).patch(update_goal).delete(delete_goal),
        )
        .route("/api/goals/{id}/walks", post(log_walk))
        .route("/api/push/subscribe", post(subscribe))
        .route("/api/push/unsubscribe", post(unsubscribe))
}

fn validate_target(target: f64) -> Result<f64, ApiError> {
    if target.is_finite() && target > 0.0 {
        Ok(target)
    } else {
        Err(ApiError::bad_request("target must be greater than 0"))
    }
}

/// RFC 3339 timestamp, normalized to UTC.
fn validate_remind_at(value: &str) -> Result<String, ApiError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true))
        .map_err(|_| ApiError::bad_request("remind_at must be an RFC 3339 timestamp"))
}

fn validate_endpoint(endpoint: &str) -> Result<String, ApiError> {
    let endpoint = endpoint.trim();
    if !endpoint.starts_with("https://") || endpoint.len() <= "https://".len() {
        return Err(ApiError::bad_request("endpoint must be an https URL"));
    }
    if endpoint.len() > MAX_ENDPOINT {
        return Err(ApiError::bad_request(format!(
            "endpoint must be at most {} characters",
            MAX_ENDPOINT
        )));
    }
    Ok(endpoint.to_string())
}

/// Build the patch for a goal update. At least one field is required.
pub fn goal_patch(req: &UpdateGoalRequest) -> Result<Value, ApiError> {
    let mut patch = Map::new();
    if let Some(title) = &req.title {
        patch.insert("title".into(), json!(required_text("title", title, MAX_TITLE)?));
    }
    if let Some(target) = req.target {
        patch.insert("target".into(), json!(validate_target(target)?));
    }
    if let Some(remind_at) = &req.remind_at {
        let value = if remind_at.trim().is_empty() {
            Value::Null
        } else {
            json!(validate_remind_at(remind_at)?)
        };
        patch.insert("remind_at".into(), value);
    }
    if let Some(done) = req.done {
        patch.insert("done".into(), json!(done));
    }
    if patch.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    Ok(Value::Object(patch))
}

async fn find_own_goal(client: &BackendClient, user: &User, id: &str) -> Result<Goal, ApiError> {
    find_one(
        client
            .from(GOALS)
            .select("*")
            .eq("id", id)
            .eq("user_id", user.id.as_str()),
    )
    .await?
    .ok_or_else(|| ApiError::not_found(format!("Goal {} not found", id)))
}

async fn update_own_goal(
    client: &BackendClient,
    user: &User,
    id: &str,
    patch: Value,
) -> Result<Goal, ApiError> {
    let updated: Vec<Goal> = client
        .from(GOALS)
        .update(patch)
        .eq("id", id)
        .eq("user_id", user.id.as_str())
        .fetch()
        .await?;
    updated
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found(format!("Goal {} not found", id)))
}

/// Add `distance_km` to a goal's progress. The update only applies if the
/// progress is still the value it was computed from; a lost race re-reads.
async fn add_progress(
    client: &BackendClient,
    user: &User,
    id: &str,
    distance_km: f64,
) -> Result<Goal, ApiError> {
    for _ in 0..PROGRESS_ATTEMPTS {
        let goal = find_own_goal(client, user, id).await?;
        let progress = goal.progress + distance_km;
        let updated: Vec<Goal> = client
            .from(GOALS)
            .update(json!({ "progress": progress, "done": goal.done || progress >= goal.target }))
            .eq("id", id)
            .eq("user_id", user.id.as_str())
            .eq("progress", goal.progress)
            .fetch()
            .await?;
        if let Some(goal) = updated.into_iter().next() {
            return Ok(goal);
        }
        debug!(goal_id = %id, "goal progress changed underneath, retrying");
    }
    Err(ApiError::conflict(format!(
        "Goal {} is being updated elsewhere, try again",
        id
    )))
}

async fn list_goals(ScopedClient(client): ScopedClient) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let goals: Vec<Goal> = client
        .from(GOALS)
        .select("*")
        .eq("user_id", user.id.as_str())
        .order("created_at", false)
        .fetch()
        .await?;
    Ok(Json(goals))
}

async fn create_goal(
    ScopedClient(client): ScopedClient,
    ApiJson(req): ApiJson<CreateGoalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let title = required_text("title", &req.title, MAX_TITLE)?;
    let target = validate_target(req.target)?;
    let remind_at = match req.remind_at.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Some(validate_remind_at(value)?),
        _ => None,
    };

    let goal: Goal = insert_one(
        client.from(GOALS),
        json!({
            "user_id": user.id,
            "title": title,
            "target": target,
            "progress": 0.0,
            "remind_at": remind_at,
            "done": false,
        }),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(goal)))
}

async fn get_goal(
    ScopedClient(client): ScopedClient,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    Ok(Json(find_own_goal(&client, &user, &id).await?))
}

async fn update_goal(
    ScopedClient(client): ScopedClient,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateGoalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let patch = goal_patch(&req)?;
    Ok(Json(update_own_goal(&client, &user, &id, patch).await?))
}

async fn delete_goal(
    ScopedClient(client): ScopedClient,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let removed = client
        .from(GOALS)
        .delete()
        .eq("id", id.as_str())
        .eq("user_id", user.id.as_str())
        .execute()
        .await?;
    if removed.rows.is_empty() {
        return Err(ApiError::not_found(format!("Goal {} not found", id)));
    }
    info!(goal_id = %id, "goal deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn log_walk(
    ScopedClient(client): ScopedClient,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<LogWalkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    if !(req.distance_km.is_finite() && req.distance_km > 0.0 && req.distance_km <= MAX_WALK_KM) {
        return Err(ApiError::bad_request(format!(
            "distance_km must be greater than 0 and at most {}",
            MAX_WALK_KM
        )));
    }
    if !(1..=MAX_WALK_MINUTES).contains(&req.minutes) {
        return Err(ApiError::bad_request(format!(
            "minutes must be between 1 and {}",
            MAX_WALK_MINUTES
        )));
    }
    let goal = add_progress(&client, &user, &id, req.distance_km).await?;

    let walk: Walk = insert_one(
        client.from(WALKS),
        json!({
            "goal_id": goal.id,
            "user_id": user.id,
            "distance_km": req.distance_km,
            "minutes": req.minutes,
        }),
    )
    .await?;
    if goal.done {
        info!(goal_id = %goal.id, "goal reached");
    }
    Ok((StatusCode::CREATED, Json(json!({ "walk": walk, "goal": goal }))))
}

async fn subscribe(
    ScopedClient(client): ScopedClient,
    ApiJson(req): ApiJson<SubscribeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let endpoint = validate_endpoint(&req.endpoint)?;
    let p256dh = required_text("keys.p256dh", &req.keys.p256dh, MAX_PUSH_KEY)?;
    let auth = required_text("keys.auth", &req.keys.auth, MAX_PUSH_KEY)?;

    // Upsert: one row per (user, endpoint).
    client
        .from(PUSH_SUBSCRIPTIONS)
        .delete()
        .eq("user_id", user.id.as_str())
        .eq("endpoint", endpoint.as_str())
        .execute()
        .await?;
    let subscription: PushSubscription = insert_one(
        client.from(PUSH_SUBSCRIPTIONS),
        json!({
            "user_id": user.id,
            "endpoint": endpoint,
            "p256dh": p256dh,
            "auth": auth,
        }),
    )
    .await?;
    info!(subscription_id = %subscription.id, "push endpoint registered");
    Ok((StatusCode::CREATED, Json(subscription)))
}

async fn unsubscribe(
    ScopedClient(client): ScopedClient,
    ApiJson(req): ApiJson<UnsubscribeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let endpoint = validate_endpoint(&req.endpoint)?;
    let removed = client
        .from(PUSH_SUBSCRIPTIONS)
        .delete()
        .eq("user_id", user.id.as_str())
        .eq("endpoint", endpoint.as_str())
        .execute()
        .await?;
    Ok(Json(json!({ "removed": removed.rows.len() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing::{TestApp, update_by_id};
    use axum::http::Method;

    async fn create(app: &TestApp, cookie: &str, body: Value) -> Value {
        let (status, goal) = app
            .call(Method::POST, "/api/goals", Some(cookie), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        goal
    }

    #[test]
    fn test_goal_patch_requires_a_field() {
        let err = goal_patch(&UpdateGoalRequest::default()).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg == "No fields to update"));
    }

    #[test]
    fn test_goal_patch_normalizes_remind_at() {
        let patch = goal_patch(&UpdateGoalRequest {
            remind_at: Some("2026-05-01T09:30:00+02:00".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(patch["remind_at"], "2026-05-01T07:30:00Z");

        let cleared = goal_patch(&UpdateGoalRequest {
            remind_at: Some("".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cleared["remind_at"], Value::Null);
    }

    #[test]
    fn test_endpoint_must_be_https() {
        assert!(validate_endpoint("https://push.example.com/abc").is_ok());
        assert!(validate_endpoint("http://push.example.com/abc").is_err());
        assert!(validate_endpoint("https://").is_err());
    }

    #[tokio::test]
    async fn test_goal_crud() {
        let app = TestApp::new();
        let (_, cookie) = app.sign_in("walker@example.com");

        let goal = create(&app, &cookie, json!({"title": "100 km in May", "target": 100})).await;
        let uri = format!("/api/goals/{}", goal["id"].as_str().unwrap());
        assert_eq!(goal["progress"], 0.0);

        let (status, updated) = app
            .call(Method::PATCH, &uri, Some(&cookie), Some(json!({"title": "120 km", "target": 120})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "120 km");
        assert_eq!(updated["target"], 120.0);

        let (status, list) = app.call(Method::GET, "/api/goals", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let resp = app.send(Method::DELETE, &uri, Some(&cookie), None).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let (status, _) = app.call(Method::GET, &uri, Some(&cookie), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let resp = app.send(Method::DELETE, &uri, Some(&cookie), None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_goal_validation() {
        let app = TestApp::new();
        let (_, cookie) = app.sign_in("walker@example.com");
        for body in [
            json!({"title": "", "target": 5}),
            json!({"title": "t".repeat(MAX_TITLE + 1), "target": 5}),
            json!({"title": "ok", "target": 0}),
            json!({"title": "ok", "target": -3}),
            json!({"title": "ok", "target": 5, "remind_at": "tomorrow"}),
        ] {
            let (status, _) = app
                .call(Method::POST, "/api/goals", Some(&cookie), Some(body))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert!(app.store.rows(GOALS).await.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_goal_is_404() {
        let app = TestApp::new();
        app.store
            .seed(GOALS, [json!({"id": "g1", "user_id": "other", "title": "Theirs", "target": 5.0})])
            .await;
        let (_, cookie) = app.sign_in("walker@example.com");

        let (status, _) = app.call(Method::GET, "/api/goals/g1", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app
            .call(Method::PATCH, "/api/goals/g1", Some(&cookie), Some(json!({"done": true})))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app
            .call(
                Method::POST,
                "/api/goals/g1/walks",
                Some(&cookie),
                Some(json!({"distance_km": 2.0, "minutes": 30})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(app.store.rows(WALKS).await.is_empty());
    }

    #[tokio::test]
    async fn test_walks_accumulate_until_done() {
        let app = TestApp::new();
        let (_, cookie) = app.sign_in("walker@example.com");
        let goal = create(&app, &cookie, json!({"title": "Stroll", "target": 5})).await;
        let uri = format!("/api/goals/{}/walks", goal["id"].as_str().unwrap());

        let (status, body) = app
            .call(Method::POST, &uri, Some(&cookie), Some(json!({"distance_km": 3.0, "minutes": 40})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["goal"]["progress"], 3.0);
        assert_eq!(body["goal"]["done"], false);

        let (_, body) = app
            .call(Method::POST, &uri, Some(&cookie), Some(json!({"distance_km": 2.5, "minutes": 35})))
            .await;
        assert_eq!(body["goal"]["progress"], 5.5);
        assert_eq!(body["goal"]["done"], true);
        assert_eq!(body["walk"]["minutes"], 35);

        let (status, _) = app
            .call(Method::POST, &uri, Some(&cookie), Some(json!({"distance_km": 0, "minutes": 10})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app
            .call(Method::POST, &uri, Some(&cookie), Some(json!({"distance_km": 1.0, "minutes": 0})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.store.rows(WALKS).await.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_walk_is_not_lost() {
        let app = TestApp::new();
        let (_, cookie) = app.sign_in("walker@example.com");
        let goal = create(&app, &cookie, json!({"title": "Hike", "target": 10})).await;
        let id = goal["id"].as_str().unwrap();
        app.store
            .interleave_before_update(update_by_id(GOALS, id, json!({"progress": 2.0})));

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/goals/{}/walks", id),
                Some(&cookie),
                Some(json!({"distance_km": 1.5, "minutes": 20})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["goal"]["progress"], 3.5);
        assert_eq!(app.store.rows(WALKS).await.len(), 1);
    }

    #[tokio::test]
    async fn test_walk_under_constant_contention_is_409() {
        let app = TestApp::new();
        let (_, cookie) = app.sign_in("walker@example.com");
        let goal = create(&app, &cookie, json!({"title": "Hike", "target": 10})).await;
        let id = goal["id"].as_str().unwrap();
        for n in 1..=PROGRESS_ATTEMPTS {
            app.store
                .interleave_before_update(update_by_id(GOALS, id, json!({"progress": n as f64})));
        }

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/goals/{}/walks", id),
                Some(&cookie),
                Some(json!({"distance_km": 1.5, "minutes": 20})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("try again"));
        assert!(app.store.rows(WALKS).await.is_empty());
        assert_eq!(
            app.store.rows(GOALS).await[0]["progress"],
            PROGRESS_ATTEMPTS as f64
        );
    }

    #[tokio::test]
    async fn test_push_subscribe_upserts_and_unsubscribes() {
        let app = TestApp::new();
        let (_, cookie) = app.sign_in("push@example.com");
        let sub = |auth: &str| {
            json!({
                "endpoint": "https://push.example.com/send/abc",
                "keys": {"p256dh": "BNcRd", "auth": auth},
            })
        };

        let (status, _) = app
            .call(Method::POST, "/api/push/subscribe", Some(&cookie), Some(sub("k1")))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = app
            .call(Method::POST, "/api/push/subscribe", Some(&cookie), Some(sub("k2")))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["auth"], "k2");
        assert_eq!(app.store.rows(PUSH_SUBSCRIPTIONS).await.len(), 1);

        let (status, body) = app
            .call(
                Method::POST,
                "/api/push/unsubscribe",
                Some(&cookie),
                Some(json!({"endpoint": "https://push.example.com/send/abc"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 1);
        assert!(app.store.rows(PUSH_SUBSCRIPTIONS).await.is_empty());
    }

    #[tokio::test]
    async fn test_push_rejects_plain_http() {
        let app = TestApp::new();
        let (_, cookie) = app.sign_in("push@example.com");
        let (status, body) = app
            .call(
                Method::POST,
                "/api/push/subscribe",
                Some(&cookie),
                Some(json!({"endpoint": "http://push.example.com/x", "keys": {"p256dh": "a", "auth": "b"}})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "endpoint must be an https URL");
    }

    #[tokio::test]
    async fn test_push_requires_session() {
        let app = TestApp::new();
        let (status, _) = app
            .call(
                Method::POST,
                "/api/push/unsubscribe",
                None,
                Some(json!({"endpoint": "https://push.example.com/x"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(app.store.calls(), 0);
    }
}
