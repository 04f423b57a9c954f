//! Service directory: the HTML landing page and the registry JSON API.

use axum::{
    Json, Router,
    extract::Path,
    response::{Html, IntoResponse},
    routing::get,
};
use hub_services::{Service, get_ready_services, get_service_by_id, services};
use serde::Deserialize;
use tracing::debug;

use super::api::SharedState;
use super::extract::ApiQuery;
use super::session::RenderClient;
use crate::errors::ApiError;

#[derive(Deserialize)]
pub struct ServicesQuery {
    #[serde(default)]
    pub ready: bool,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(index_page))
        .route("/api/services", get(list_services))
        .route("/api/services/{id}", get(get_service))
}

async fn list_services(ApiQuery(params): ApiQuery<ServicesQuery>) -> Json<Vec<&'static Service>> {
    if params.ready {
        Json(get_ready_services())
    } else {
        Json(services().iter().collect())
    }
}

async fn get_service(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    get_service_by_id(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Service '{}' not found", id)))
}

/// Render pass. The client is read-only: an expired session may be refreshed
/// for display but the new cookie is not written.
async fn index_page(RenderClient(client): RenderClient) -> Html<String> {
    let greeting = match client.auth().get_user().await {
        Ok(Some(user)) => user.email,
        Ok(None) => None,
        Err(e) => {
            debug!(error = %e, "directory render without user");
            None
        }
    };
    Html(render_directory(&get_ready_services(), greeting.as_deref()))
}

pub fn render_directory(ready: &[&Service], signed_in_as: Option<&str>) -> String {
    let mut cards = String::new();
    for service in ready {
        cards.push_str(&format!(
            r#"    <a class="card" href="{path}" style="border-color: {color}">
      <span class="icon">{icon}</span>
      <h2>{name}</h2>
      <p>{description}</p>
    </a>
"#,
            path = escape_html(&service.path()),
            color = escape_html(service.color),
            icon = escape_html(service.icon),
            name = escape_html(service.name),
            description = escape_html(service.description),
        ));
    }
    if ready.is_empty() {
        cards.push_str("    <p>No services are open yet.</p>\n");
    }

    let account = match signed_in_as {
        Some(email) => format!(
            r#"<form method="post" action="/auth/signout">Signed in as {} <button>Sign out</button></form>"#,
            escape_html(email)
        ),
        None => r#"<a href="/auth/login?provider=github">Sign in</a>"#.to_string(),
    };

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>hubkit</title>
</head>
<body>
  <header>{account}</header>
  <main>
{cards}  </main>
</body>
</html>
"#
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
