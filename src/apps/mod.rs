//! Per-app route modules. Each exposes `router()` and talks to the backend
//! only through the request's [`ScopedClient`](crate::server::session::ScopedClient).
//!
//! | Module      | Routes                                                |
//! |-------------|-------------------------------------------------------|
//! | `webtoon`   | `/api/webtoon/stories`, comments, preview requests     |
//! | `orders`    | `/api/orders`, the step wizard                         |
//! | `mentor`    | `/api/mentor/personas`, chat messages                  |
//! | `jobs`      | `/api/jobs`                                            |
//! | `remind`    | `/api/goals`, walks, `/api/push/*`                     |
//! | `recommend` | `/api/recommendations`, `/api/suggestions`             |

pub mod jobs;
pub mod mentor;
pub mod orders;
pub mod recommend;
pub mod remind;
pub mod webtoon;

use hub_backend::QueryBuilder;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::ApiError;

/// Insert one row and return it as stored.
pub(crate) async fn insert_one<T: DeserializeOwned>(
    query: QueryBuilder<'_>,
    row: Value,
) -> Result<T, ApiError> {
    let collection = query.query().collection.clone();
    query
        .insert(row)
        .fetch::<T>()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("insert into '{}' returned no row", collection).into())
}

/// First row matching an already-filtered query.
pub(crate) async fn find_one<T: DeserializeOwned>(
    query: QueryBuilder<'_>,
) -> Result<Option<T>, ApiError> {
    Ok(query.limit(1).fetch::<T>().await?.into_iter().next())
}

/// Trimmed text of 1..=`max` characters.
pub(crate) fn required_text(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{} is required", field)));
    }
    if value.chars().count() > max {
        return Err(ApiError::bad_request(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(value.to_string())
}

/// Trimmed text of at most `max` characters; blank is `None`.
pub(crate) fn optional_text(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => required_text(field, v, max).map(Some),
    }
}
