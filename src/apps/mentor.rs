//! AI chat mentor: user-defined personas and their chat transcripts.
//!
//! Only user turns are written here. Assistant replies are produced by the
//! managed generation service and land in the same collection.

use axum::{
    Json, Router,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use hub_backend::{BackendClient, User};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{find_one, insert_one, optional_text, required_text};
use crate::errors::ApiError;
use crate::server::SharedState;
use crate::server::extract::ApiJson;
use crate::server::session::{ScopedClient, require_user};

pub const PERSONAS: &str = "personas";
pub const CHAT_MESSAGES: &str = "chat_messages";

pub const MAX_NAME: usize = 50;
pub const MAX_DESCRIPTION: usize = 300;
pub const MAX_SYSTEM_PROMPT: usize = 2000;
pub const MAX_MESSAGE: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub persona_id: String,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
pub struct CreatePersonaRequest {
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
}

#[derive(Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/mentor/personas",
            get(list_personas).post(create_persona),
        )
        .route(
            "/api/mentor/personas/{id}/messages",
            get(list_messages).post(post_message),
        )
}

async fn find_own_persona(
    client: &BackendClient,
    user: &User,
    id: &str,
) -> Result<Persona, ApiError> {
    find_one(
        client
            .from(PERSONAS)
            .select("*")
            .eq("id", id)
            .eq("user_id", user.id.as_str()),
    )
    .await?
    .ok_or_else(|| ApiError::not_found(format!("Persona {} not found", id)))
}

async fn list_personas(ScopedClient(client): ScopedClient) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let personas: Vec<Persona> = client
        .from(PERSONAS)
        .select("*")
        .eq("user_id", user.id.as_str())
        .order("created_at", true)
        .fetch()
        .await?;
    Ok(Json(personas))
}

async fn create_persona(
    ScopedClient(client): ScopedClient,
    ApiJson(req): ApiJson<CreatePersonaRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let name = required_text("name", &req.name, MAX_NAME)?;
    let description = optional_text("description", req.description.as_deref(), MAX_DESCRIPTION)?;
    let system_prompt =
        optional_text("system_prompt", req.system_prompt.as_deref(), MAX_SYSTEM_PROMPT)?;

    let persona: Persona = insert_one(
        client.from(PERSONAS),
        json!({
            "user_id": user.id,
            "name": name,
            "description": description,
            "system_prompt": system_prompt,
        }),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(persona)))
}

async fn list_messages(
    ScopedClient(client): ScopedClient,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let persona = find_own_persona(&client, &user, &id).await?;
    let messages: Vec<ChatMessage> = client
        .from(CHAT_MESSAGES)
        .select("*")
        .eq("persona_id", persona.id.as_str())
        .eq("user_id", user.id.as_str())
        .order("created_at", true)
        .fetch()
        .await?;
    Ok(Json(messages))
}

async fn post_message(
    ScopedClient(client): ScopedClient,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&client).await?;
    let content = required_text("content", &req.content, MAX_MESSAGE)?;
    let persona = find_own_persona(&client, &user, &id).await?;

    let message: ChatMessage = insert_one(
        client.from(CHAT_MESSAGES),
        json!({
            "persona_id": persona.id,
            "user_id": user.id,
            "role": Role::User,
            "content": content,
        }),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
