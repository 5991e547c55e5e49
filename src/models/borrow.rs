//! Borrow record model and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::pagination::Pagination;

/// Derived lifecycle state of a borrow record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BorrowStatus {
    Active,
    ActiveOverdue,
    Returned,
}

impl BorrowStatus {
    pub fn is_outstanding(&self) -> bool {
        !matches!(self, BorrowStatus::Returned)
    }
}

/// Borrow record from the store. Records are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRecord {
    pub id: i32,
    pub book_id: i32,
    pub borrower_name: String,
    pub borrower_email: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
}

impl BorrowRecord {
    /// Status at the reference time `now`. Pure: no state is read besides the record.
    pub fn status_at(&self, now: DateTime<Utc>) -> BorrowStatus {
        match self.return_date {
            Some(_) => BorrowStatus::Returned,
            None if self.due_date < now => BorrowStatus::ActiveOverdue,
            None => BorrowStatus::Active,
        }
    }

    pub fn is_returned(&self) -> bool {
        self.return_date.is_some()
    }

    /// How far past due the record is at `now`; zero when not overdue
    pub fn overdue_by(&self, now: DateTime<Utc>) -> Duration {
        match self.status_at(now) {
            BorrowStatus::ActiveOverdue => now - self.due_date,
            _ => Duration::zero(),
        }
    }
}

/// Values for a borrow record that has not been stored yet
#[derive(Debug, Clone)]
pub struct NewBorrowRecord {
    pub book_id: i32,
    pub borrower_name: String,
    pub borrower_email: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Borrow record as served to clients, with status evaluated at response time
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowDetails {
    pub id: i32,
    pub book_id: i32,
    pub borrower_name: String,
    pub borrower_email: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub is_overdue: bool,
    /// Whole days past due, 0 unless overdue
    pub days_overdue: i64,
}

impl BorrowDetails {
    pub fn at(record: BorrowRecord, now: DateTime<Utc>) -> Self {
        let status = record.status_at(now);
        let days_overdue = record.overdue_by(now).num_days();
        Self {
            id: record.id,
            book_id: record.book_id,
            borrower_name: record.borrower_name,
            borrower_email: record.borrower_email,
            borrow_date: record.borrow_date,
            due_date: record.due_date,
            return_date: record.return_date,
            status,
            is_overdue: status == BorrowStatus::ActiveOverdue,
            days_overdue,
        }
    }
}

/// Store-level selection of borrow records. Unset fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BorrowFilter {
    pub book_id: Option<i32>,
    /// Exact match, case-insensitive
    pub borrower_email: Option<String>,
    /// `Some(false)` keeps outstanding loans, `Some(true)` returned ones
    pub returned: Option<bool>,
    /// Keeps records due strictly before this instant
    pub due_before: Option<DateTime<Utc>>,
}

impl BorrowFilter {
    pub fn outstanding() -> Self {
        Self {
            returned: Some(false),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &BorrowRecord) -> bool {
        if let Some(book_id) = self.book_id {
            if record.book_id != book_id {
                return false;
            }
        }
        if let Some(ref email) = self.borrower_email {
            if !record.borrower_email.eq_ignore_ascii_case(email) {
                return false;
            }
        }
        if let Some(returned) = self.returned {
            if record.is_returned() != returned {
                return false;
            }
        }
        if let Some(before) = self.due_before {
            if record.due_date >= before {
                return false;
            }
        }
        true
    }
}

/// Borrow request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBorrow {
    pub book_id: i32,
    #[validate(length(min = 1, max = 100, message = "Borrower name must be 1 to 100 characters"))]
    pub borrower_name: String,
    #[validate(
        email(message = "Invalid email format"),
        length(max = 100, message = "Borrower email must be at most 100 characters")
    )]
    pub borrower_email: String,
    /// Borrowing period in days (default: 14)
    pub days: Option<i64>,
}

/// Due date extension request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ExtendBorrow {
    pub additional_days: i64,
}

/// Status filter accepted by the borrow listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatusFilter {
    /// Not yet returned, overdue or not
    Borrowed,
    Returned,
    Overdue,
}

/// Borrow listing query parameters
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
pub struct BorrowQuery {
    /// Substring filter on borrower name or email
    pub search: Option<String>,
    pub status: Option<BorrowStatusFilter>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// One page of borrow records
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowPage {
    pub borrows: Vec<BorrowDetails>,
    pub pagination: Pagination,
}
