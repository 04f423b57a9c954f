//! Job-listing aggregator. Listings are written by an external importer;
//! this app only reads them.

use axum::{
    Json, Router,
    extract::Path,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};

use super::find_one;
use crate::errors::ApiError;
use crate::server::SharedState;
use crate::server::extract::ApiQuery;
use crate::server::pagination::{Page, fetch_page};
use crate::server::session::ScopedClient;

pub const JOBS: &str = "jobs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub q: Option<String>,
    pub location: Option<String>,
    pub remote: Option<bool>,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/{id}", get(get_job))
}

/// `%term%` with the pattern and list metacharacters removed from `term`.
/// Blank terms produce no pattern.
pub fn contains_pattern(term: Option<&str>) -> Option<String> {
    let cleaned: String = term?
        .chars()
        .filter(|c| !matches!(c, '%' | '*' | '_' | ',' | '(' | ')' | '"' | '\\'))
        .collect();
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| format!("%{}%", cleaned))
}

async fn list_jobs(
    ScopedClient(client): ScopedClient,
    ApiQuery(params): ApiQuery<JobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = Page::new(params.page, params.limit);
    let mut query = client.from(JOBS).select("*");
    if let Some(pattern) = contains_pattern(params.q.as_deref()) {
        query = query.ilike("title", &pattern);
    }
    if let Some(pattern) = contains_pattern(params.location.as_deref()) {
        query = query.ilike("location", &pattern);
    }
    if let Some(remote) = params.remote {
        query = query.eq("remote", remote);
    }
    let listing = fetch_page::<JobPosting>(query.order("created_at", false), page).await?;
    Ok(Json(listing))
}

async fn get_job(
    ScopedClient(client): ScopedClient,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job: JobPosting = find_one(client.from(JOBS).select("*").eq("id", id.as_str()))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job {} not found", id)))?;
    Ok(Json(job))
}
