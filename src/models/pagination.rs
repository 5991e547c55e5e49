//! Page request normalization and the pagination envelope

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::PaginationConfig;

/// A validated page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    /// Clamp raw query values: pages start at 1, and a page size outside the allowed
    /// set falls back to the configured default.
    pub fn normalize(page: Option<i64>, per_page: Option<i64>, config: &PaginationConfig) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let per_page = per_page
            .filter(|size| config.allowed_per_page.contains(size))
            .unwrap_or(config.default_per_page);
        Self { page, per_page }
    }

    /// Number of items before this page. Saturates for absurdly large page numbers.
    pub fn offset(&self) -> usize {
        let offset = (self.page - 1).saturating_mul(self.per_page);
        usize::try_from(offset).unwrap_or(usize::MAX)
    }

    /// Slice one page out of an already ordered result set
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset())
            .take(self.per_page as usize)
            .collect()
    }
}

/// Pagination metadata returned alongside every page of results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub pages: i64,
    pub has_prev: bool,
    pub has_next: bool,
    pub prev_page: Option<i64>,
    pub next_page: Option<i64>,
}

impl Pagination {
    pub fn new(request: PageRequest, total: i64) -> Self {
        let PageRequest { page, per_page } = request;
        let pages = if total > 0 { (total + per_page - 1) / per_page } else { 0 };
        let has_prev = page > 1;
        let has_next = page.saturating_mul(per_page) < total;
        Self {
            page,
            per_page,
            total,
            pages,
            has_prev,
            has_next,
            prev_page: has_prev.then(|| page - 1),
            next_page: has_next.then(|| page + 1),
        }
    }
}
