//! Community story board: stories, comments, and preview-generation requests.
//!
//! Preview requests are only queued here; rendering them is the managed
//! generation service's job.

use axum::{
    Json, Router,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use hub_backend::BackendClient;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{find_one, insert_one, optional_text, required_text};
use crate::errors::ApiError;
use crate::server::SharedState;
use crate::server::extract::{ApiJson, ApiQuery};
use crate::server::pagination::{Page, fetch_page};
use crate::server::session::{ScopedClient, require_user};

pub const STORIES: &str = "stories";
pub const COMMENTS: &str = "comments";
pub const PREVIEW_REQUESTS: &str = "preview_requests";

pub const MAX_TITLE: usize = 100;
pub const MAX_CONTENT: usize = 5000;
pub const MAX_COMMENT: usize = 1000;
pub const MAX_PROMPT: usize = 500;
pub const MAX_STYLE: usize = 30;
pub const DEFAULT_STYLE: &str = "comic";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub story_id: String,
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub id: String,
    pub user_id: String,
    pub prompt: String,
    pub style: String,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct CreateStoryRequest {
    pub title: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

#[derive(Deserialize)]
pub struct CreatePreviewRequest {
    pub prompt: String,
    pub style: Option<String>,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/webtoon/stories", get(list_stories).post(create_story))
        .route("/api/webtoon/stories/{id}", get(get_story))
        .route(
            "/api/webtoon/stories/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route("/api/webtoon/previews", post(create_preview))
}

async fn find_story(client: &BackendClient, id: &str) -> Result<Story, ApiError> {
    find_one(client.from(STORIES).select("*").eq("id", id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Story {} not found", id)))
}

async fn list_stories(
    ScopedClient(client): ScopedClient,
    ApiQuery(params): ApiQuery<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = Page::new(params.page, params.limit);
    let listing = fetch_page::<Story>(
        client.from(STORIES).select("*").order("created_at", false),
        page,
    )
    .await?;
    Ok(Json(listing))
}

async fn create_story(
    ScopedClient(client): ScopedClient,
    ApiJson(req): ApiJson<CreateStoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let title = required_text("title", &req.title, MAX_TITLE)?;
    let content = required_text("content", &req.content, MAX_CONTENT)?;

    let story: Story = insert_one(
        client.from(STORIES),
        json!({ "user_id": user.id, "title": title, "content": content }),
    )
    .await?;
    info!(story_id = %story.id, "story created");
    Ok((StatusCode::CREATED, Json(story)))
}

async fn get_story(
    ScopedClient(client): ScopedClient,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(find_story(&client, &id).await?))
}

async fn list_comments(
    ScopedClient(client): ScopedClient,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let story = find_story(&client, &id).await?;
    let comments: Vec<Comment> = client
        .from(COMMENTS)
        .select("*")
        .eq("story_id", story.id.as_str())
        .order("created_at", true)
        .fetch()
        .await?;
    Ok(Json(comments))
}

async fn create_comment(
    ScopedClient(client): ScopedClient,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let content = required_text("content", &req.content, MAX_COMMENT)?;
    let story = find_story(&client, &id).await?;

    let comment: Comment = insert_one(
        client.from(COMMENTS),
        json!({ "story_id": story.id, "user_id": user.id, "content": content }),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn create_preview(
    ScopedClient(client): ScopedClient,
    ApiJson(req): ApiJson<CreatePreviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let prompt = required_text("prompt", &req.prompt, MAX_PROMPT)?;
    let style = optional_text("style", req.style.as_deref(), MAX_STYLE)?
        .unwrap_or_else(|| DEFAULT_STYLE.to_string());

    let preview: PreviewRequest = insert_one(
        client.from(PREVIEW_REQUESTS),
        json!({
            "user_id": user.id,
            "prompt": prompt,
            "style": style,
            "status": "queued",
        }),
    )
    .await?;
    info!(preview_id = %preview.id, style = %preview.style, "preview request queued");
    Ok((StatusCode::ACCEPTED, Json(preview)))
}
