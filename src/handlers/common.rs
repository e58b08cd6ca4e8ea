//! Response helpers shared by the route handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 100;

/// `?page=&per_page=` on list endpoints. Pages are 1-based.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    page: Option<u64>,
    per_page: Option<u64>,
}

impl PageQuery {
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u64 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// One page of a tenant-scoped listing.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PageMeta,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, query: PageQuery, total: u64) -> Self {
        let per_page = query.per_page();
        Self {
            data,
            pagination: PageMeta {
                page: query.page(),
                per_page,
                total,
                total_pages: total.div_ceil(per_page),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<u64>, per_page: Option<u64>) -> PageQuery {
        PageQuery { page, per_page }
    }

    #[test]
    fn defaults_and_clamping() {
        let q = query(None, None);
        assert_eq!((q.page(), q.per_page()), (1, 20));
        let q = query(Some(0), Some(5000));
        assert_eq!((q.page(), q.per_page()), (1, 100));
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page::new(vec![1, 2], query(Some(1), Some(20)), 41);
        assert_eq!(page.pagination.total_pages, 3);
        let empty: Page<u8> = Page::new(Vec::new(), PageQuery::default(), 0);
        assert_eq!(empty.pagination.total_pages, 0);
    }
}
