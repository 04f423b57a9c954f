//! Physical-goods order tracker. Orders move through a linear wizard:
//! `item → recipient → review → submitted`.

use axum::{
    Json, Router,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use hub_backend::{BackendClient, User};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::{find_one, insert_one, optional_text, required_text};
use crate::errors::ApiError;
use crate::server::SharedState;
use crate::server::extract::ApiJson;
use crate::server::session::{ScopedClient, require_user};

pub const ORDERS: &str = "orders";

pub const MAX_ITEM_NAME: usize = 100;
pub const MAX_QUANTITY: u32 = 99;
pub const MAX_RECIPIENT: usize = 50;
pub const MAX_ADDRESS: usize = 200;
pub const MAX_NOTE: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStep {
    Item,
    Recipient,
    Review,
    Submitted,
}

impl OrderStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStep::Item => "item",
            OrderStep::Recipient => "recipient",
            OrderStep::Review => "review",
            OrderStep::Submitted => "submitted",
        }
    }

    /// The following step; `None` once submitted.
    pub fn next(&self) -> Option<OrderStep> {
        match self {
            OrderStep::Item => Some(OrderStep::Recipient),
            OrderStep::Recipient => Some(OrderStep::Review),
            OrderStep::Review => Some(OrderStep::Submitted),
            OrderStep::Submitted => None,
        }
    }
}

impl std::fmt::Display for OrderStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub step: OrderStep,
    pub status: String,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Fields for whichever step the order is on. Unrelated fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct StepRequest {
    pub item_name: Option<String>,
    pub quantity: Option<u32>,
    pub recipient: Option<String>,
    pub address: Option<String>,
    pub note: Option<String>,
    pub confirm: Option<bool>,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/steps", post(submit_step))
}

/// Validate `req` against `step` and build the row patch that advances it.
pub fn step_patch(step: OrderStep, req: &StepRequest) -> Result<Value, ApiError> {
    let mut patch = match step {
        OrderStep::Item => {
            let item_name = required_text(
                "item_name",
                req.item_name.as_deref().unwrap_or_default(),
                MAX_ITEM_NAME,
            )?;
            let quantity = req
                .quantity
                .ok_or_else(|| ApiError::bad_request("quantity is required"))?;
            if !(1..=MAX_QUANTITY).contains(&quantity) {
                return Err(ApiError::bad_request(format!(
                    "quantity must be between 1 and {}",
                    MAX_QUANTITY
                )));
            }
            json!({ "item_name": item_name, "quantity": quantity })
        }
        OrderStep::Recipient => {
            let recipient = required_text(
                "recipient",
                req.recipient.as_deref().unwrap_or_default(),
                MAX_RECIPIENT,
            )?;
            let address = required_text(
                "address",
                req.address.as_deref().unwrap_or_default(),
                MAX_ADDRESS,
            )?;
            let note = optional_text("note", req.note.as_deref(), MAX_NOTE)?;
            json!({ "recipient": recipient, "address": address, "note": note })
        }
        OrderStep::Review => {
            if req.confirm != Some(true) {
                return Err(ApiError::bad_request("confirm must be true to submit"));
            }
            json!({ "status": "submitted" })
        }
        OrderStep::Submitted => return Err(ApiError::bad_request("Order already submitted")),
    };

    if let (Value::Object(map), Some(next)) = (&mut patch, step.next()) {
        map.insert("step".to_string(), json!(next.as_str()));
    }
    Ok(patch)
}

async fn find_own_order(client: &BackendClient, user: &User, id: &str) -> Result<Order, ApiError> {
    find_one(
        client
            .from(ORDERS)
            .select("*")
            .eq("id", id)
            .eq("user_id", user.id.as_str()),
    )
    .await?
    .ok_or_else(|| ApiError::not_found(format!("Order {} not found", id)))
}

async fn list_orders(ScopedClient(client): ScopedClient) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let orders: Vec<Order> = client
        .from(ORDERS)
        .select("*")
        .eq("user_id", user.id.as_str())
        .order("created_at", false)
        .fetch()
        .await?;
    Ok(Json(orders))
}

async fn create_order(ScopedClient(client): ScopedClient) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let order: Order = insert_one(
        client.from(ORDERS),
        json!({
            "user_id": user.id,
            "step": OrderStep::Item.as_str(),
            "status": "draft",
        }),
    )
    .await?;
    info!(order_id = %order.id, "order started");
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(
    ScopedClient(client): ScopedClient,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    Ok(Json(find_own_order(&client, &user, &id).await?))
}

async fn submit_step(
    ScopedClient(client): ScopedClient,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<StepRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let order = find_own_order(&client, &user, &id).await?;
    let patch = step_patch(order.step, &req)?;

    let updated: Option<Order> = client
        .from(ORDERS)
        .update(patch)
        .eq("id", order.id.as_str())
        .eq("user_id", user.id.as_str())
        .eq("step", order.step.as_str())
        .fetch()
        .await?
        .into_iter()
        .next();
    let updated = updated.ok_or_else(|| {
        ApiError::conflict(format!(
            "Order {} moved past the {} step, reload and try again",
            id, order.step
        ))
    })?;
    info!(order_id = %updated.id, step = %updated.step, "order advanced");
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing::{TestApp, update_by_id};
    use axum::http::Method;

    #[test]
    fn test_step_sequence() {
        assert_eq!(OrderStep::Item.next(), Some(OrderStep::Recipient));
        assert_eq!(OrderStep::Recipient.next(), Some(OrderStep::Review));
        assert_eq!(OrderStep::Review.next(), Some(OrderStep::Submitted));
        assert_eq!(OrderStep::Submitted.next(), None);
    }

    #[test]
    fn test_item_step_validation() {
        let ok = StepRequest {
            item_name: Some("Mug".into()),
            quantity: Some(2),
            ..Default::default()
        };
        let patch = step_patch(OrderStep::Item, &ok).unwrap();
        assert_eq!(patch["step"], "recipient");
        assert_eq!(patch["quantity"], 2);

        let zero = StepRequest {
            item_name: Some("Mug".into()),
            quantity: Some(0),
            ..Default::default()
        };
        assert!(step_patch(OrderStep::Item, &zero).is_err());

        let too_many = StepRequest {
            item_name: Some("Mug".into()),
            quantity: Some(100),
            ..Default::default()
        };
        assert!(step_patch(OrderStep::Item, &too_many).is_err());
    }

    #[test]
    fn test_review_requires_confirm() {
        assert!(step_patch(OrderStep::Review, &StepRequest::default()).is_err());
        let confirm = StepRequest {
            confirm: Some(true),
            ..Default::default()
        };
        let patch = step_patch(OrderStep::Review, &confirm).unwrap();
        assert_eq!(patch["status"], "submitted");
        assert_eq!(patch["step"], "submitted");
    }

    #[test]
    fn test_submitted_order_rejects_steps() {
        let err = step_patch(OrderStep::Submitted, &StepRequest::default()).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg == "Order already submitted"));
    }

    #[tokio::test]
    async fn test_full_wizard() {
        let app = TestApp::new();
        let (_, cookie) = app.sign_in("buyer@example.com");

        let (status, order) = app
            .call(Method::POST, "/api/orders", Some(&cookie), None)
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["step"], "item");
        let uri = format!("/api/orders/{}/steps", order["id"].as_str().unwrap());

        let steps = [
            json!({"item_name": "Tea set", "quantity": 1}),
            json!({"recipient": "Gran", "address": "1 Harbour Rd", "note": "ring twice"}),
            json!({"confirm": true}),
        ];
        let expected = ["recipient", "review", "submitted"];
        for (body, want) in steps.into_iter().zip(expected) {
            let (status, order) = app.call(Method::POST, &uri, Some(&cookie), Some(body)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(order["step"], want);
        }

        let (status, body) = app
            .call(Method::POST, &uri, Some(&cookie), Some(json!({"confirm": true})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Order already submitted");

        let (_, orders) = app.call(Method::GET, "/api/orders", Some(&cookie), None).await;
        assert_eq!(orders[0]["status"], "submitted");
        assert_eq!(orders[0]["item_name"], "Tea set");
    }

    #[tokio::test]
    async fn test_step_submitted_twice_applies_once() {
        let app = TestApp::new();
        let (_, cookie) = app.sign_in("buyer@example.com");
        let (_, order) = app
            .call(Method::POST, "/api/orders", Some(&cookie), None)
            .await;
        let id = order["id"].as_str().unwrap();
        app.store.interleave_before_update(update_by_id(
            ORDERS,
            id,
            json!({"item_name": "Kettle", "quantity": 1, "step": "recipient"}),
        ));

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/orders/{}/steps", id),
                Some(&cookie),
                Some(json!({"item_name": "Tea set", "quantity": 2})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("item step"));

        let rows = app.store.rows(ORDERS).await;
        assert_eq!(rows[0]["step"], "recipient");
        assert_eq!(rows[0]["item_name"], "Kettle");
    }

    #[tokio::test]
    async fn test_unknown_or_foreign_order_is_404() {
        let app = TestApp::new();
        app.store
            .seed(ORDERS, [json!({"id": "o1", "user_id": "someone-else", "step": "item", "status": "draft"})])
            .await;
        let (_, cookie) = app.sign_in("buyer@example.com");

        let (status, _) = app
            .call(Method::GET, "/api/orders/o1", Some(&cookie), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .call(Method::GET, "/api/orders/does-not-exist", Some(&cookie), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .call(
                Method::POST,
                "/api/orders/o1/steps",
                Some(&cookie),
                Some(json!({"item_name": "x", "quantity": 1})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_orders_require_session() {
        let app = TestApp::new();
        let (status, _) = app.call(Method::GET, "/api/orders", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = app.call(Method::POST, "/api/orders", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(app.store.calls(), 0);
    }
}
