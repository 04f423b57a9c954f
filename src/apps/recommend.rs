//! Recommendation app: a public, filterable catalogue plus free-text
//! suggestions from signed-in users.

use axum::{
    Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{insert_one, optional_text, required_text};
use crate::errors::ApiError;
use crate::server::SharedState;
use crate::server::extract::{ApiJson, ApiQuery};
use crate::server::pagination::{Page, fetch_page};
use crate::server::session::{ScopedClient, require_user};

pub const RECOMMENDATIONS: &str = "recommendations";
pub const SUGGESTIONS: &str = "suggestions";

pub const MAX_TITLE: usize = 100;
pub const MAX_BODY: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
pub struct RecommendationsQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateSuggestionRequest {
    pub title: String,
    pub body: Option<String>,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/recommendations", get(list_recommendations))
        .route("/api/suggestions", post(create_suggestion))
}

async fn list_recommendations(
    ScopedClient(client): ScopedClient,
    ApiQuery(params): ApiQuery<RecommendationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = Page::new(params.page, params.limit);
    let mut query = client.from(RECOMMENDATIONS).select("*");
    if let Some(category) = params.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        query = query.eq("category", category);
    }
    let listing =
        fetch_page::<Recommendation>(query.order("created_at", false), page).await?;
    Ok(Json(listing))
}

async fn create_suggestion(
    ScopedClient(client): ScopedClient,
    ApiJson(req): ApiJson<CreateSuggestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let title = required_text("title", &req.title, MAX_TITLE)?;
    let body = optional_text("body", req.body.as_deref(), MAX_BODY)?;

    let suggestion: Suggestion = insert_one(
        client.from(SUGGESTIONS),
        json!({ "user_id": user.id, "title": title, "body": body }),
    )
    .await?;
    info!(suggestion_id = %suggestion.id, "suggestion received");
    Ok((StatusCode::CREATED, Json(suggestion)))
}
