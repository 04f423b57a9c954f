//! Demo content for `hubkit serve --memory`.

use hub_backend::{MemoryAuth, MemoryDatastore, User};
use serde_json::json;

use crate::apps::{jobs::JOBS, recommend::RECOMMENDATIONS, webtoon::STORIES};

pub const DEMO_EMAIL: &str = "demo@hubkit.local";
pub const DEMO_PASSWORD: &str = "demo-password";

/// Register the demo account and fill the public collections.
pub async fn seed_demo(store: &MemoryDatastore, auth: &MemoryAuth) -> User {
    let user = auth.register(DEMO_EMAIL, DEMO_PASSWORD);

    store
        .seed(
            STORIES,
            [
                json!({
                    "user_id": user.id,
                    "title": "The Lighthouse Keeper",
                    "content": "Every night the lamp turned, and every night the sea answered.",
                    "created_at": "2026-01-05T20:00:00Z",
                }),
                json!({
                    "user_id": user.id,
                    "title": "Paper Cranes",
                    "content": "She folded one for every letter she never sent.",
                    "created_at": "2026-01-06T20:00:00Z",
                }),
            ],
        )
        .await;

    store
        .seed(
            JOBS,
            [
                json!({
                    "title": "Backend Engineer (Rust)",
                    "company": "Harbour Systems",
                    "location": "Berlin",
                    "remote": true,
                    "tags": ["rust", "postgres"],
                    "created_at": "2026-02-01T09:00:00Z",
                }),
                json!({
                    "title": "Product Designer",
                    "company": "Fold Studio",
                    "location": "Lisbon",
                    "remote": false,
                    "tags": ["figma"],
                    "created_at": "2026-02-02T09:00:00Z",
                }),
            ],
        )
        .await;

    store
        .seed(
            RECOMMENDATIONS,
            [
                json!({"title": "The Left Hand of Darkness", "category": "books"}),
                json!({"title": "Spirited Away", "category": "films"}),
                json!({"title": "Walk the coast path at dawn", "category": "outdoors"}),
            ],
        )
        .await;

    user
}
