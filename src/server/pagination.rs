use hub_backend::{BackendError, QueryBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// A resolved page request: `page` is 1-based, `limit` clamped to `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    pub fn new(page: Option<usize>, limit: Option<usize>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    /// Inclusive row range for this page.
    pub fn range(&self) -> (usize, usize) {
        let from = (self.page - 1).saturating_mul(self.limit);
        (from, from.saturating_add(self.limit - 1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    #[serde(rename = "totalPages")]
    pub total_pages: usize,
}

impl Pagination {
    pub fn new(page: Page, total: usize) -> Self {
        Self {
            page: page.page,
            limit: page.limit,
            total,
            total_pages: total.div_ceil(page.limit),
        }
    }
}

/// `{ items, pagination }` listing body.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Run a listing query for one page, counting the full result set.
pub async fn fetch_page<T: DeserializeOwned>(
    query: QueryBuilder<'_>,
    page: Page,
) -> Result<Paginated<T>, BackendError> {
    let (from, to) = page.range();
    let resp = query.count_exact().range(from, to).execute().await?;
    let total = resp.count.unwrap_or(resp.rows.len());
    Ok(Paginated {
        items: resp.into_typed()?,
        pagination: Pagination::new(page, total),
    })
}
