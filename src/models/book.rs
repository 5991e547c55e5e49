//! Book model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::pagination::Pagination;

/// Book model from the store.
///
/// `0 <= available_copies <= total_copies` holds for every persisted book; only the
/// lending ledger moves `available_copies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Copies currently out on loan
    pub fn on_loan(&self) -> i32 {
        self.total_copies - self.available_copies
    }

    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }

    /// Whether the availability counters are within bounds
    pub fn counts_consistent(&self) -> bool {
        0 <= self.available_copies && self.available_copies <= self.total_copies
    }

    /// Case-insensitive substring match over title and author.
    /// `needle` must already be lowercase.
    pub fn matches_text(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.author.to_lowercase().contains(needle)
    }
}

/// Values for a book that has not been stored yet
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub total_copies: i32,
    pub created_at: DateTime<Utc>,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 100, message = "Title must be 1 to 100 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 100, message = "Author must be 1 to 100 characters"))]
    pub author: String,
    #[validate(length(min = 10, max = 13, message = "ISBN must be 10 to 13 characters"))]
    pub isbn: String,
    /// Number of copies owned (default: 1)
    #[validate(range(min = 1, message = "A book needs at least one copy"))]
    pub total_copies: Option<i32>,
}

/// Update book request. Copy counts are not editable here.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 100, message = "Title must be 1 to 100 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Author must be 1 to 100 characters"))]
    pub author: Option<String>,
    #[validate(length(min = 10, max = 13, message = "ISBN must be 10 to 13 characters"))]
    pub isbn: Option<String>,
}

/// Book listing query parameters
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Substring filter on title or author
    pub search: Option<String>,
    /// Only books with at least one copy on the shelf
    pub available_only: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Free-text search parameters
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// One page of books
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookPage {
    pub books: Vec<Book>,
    pub pagination: Pagination,
}
