//! Lending ledger: borrow / return / extend transitions and overdue derivation
//!
//! Every transition touching a book's availability runs under that book's lock, so
//! the check-then-act sequences below are atomic with respect to each other within
//! the process. The store is only ever written through this module for
//! `available_copies`, `due_date` and `return_date`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{
        borrow::{BorrowQuery, BorrowStatusFilter},
        Book, BorrowDetails, BorrowFilter, BorrowPage, BorrowRecord, BorrowStatus,
        NewBorrowRecord, PageRequest, Pagination,
    },
    repository::Store,
};

use super::clock::Clock;

/// One async mutex per book id, created on first use
#[derive(Default)]
struct BookLocks {
    locks: Mutex<HashMap<i32, Arc<AsyncMutex<()>>>>,
}

impl BookLocks {
    async fn acquire(&self, book_id: i32) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(book_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Counts of outstanding loans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanCounts {
    pub active: i64,
    pub overdue: i64,
}

#[derive(Clone)]
pub struct LendingLedger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: LendingConfig,
    locks: Arc<BookLocks>,
}

impl LendingLedger {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: LendingConfig) -> Self {
        Self {
            store,
            clock,
            config,
            locks: Arc::new(BookLocks::default()),
        }
    }

    /// Current time according to the ledger's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn default_period_days(&self) -> i64 {
        self.config.default_period_days
    }

    /// Hold the lock of one book. Catalog operations that must not interleave with
    /// lending transitions (deletion) take it too.
    pub(crate) async fn lock_book(&self, book_id: i32) -> OwnedMutexGuard<()> {
        self.locks.acquire(book_id).await
    }

    /// Lend one copy of a book for `period_days` days
    pub async fn borrow(
        &self,
        book_id: i32,
        borrower_name: &str,
        borrower_email: &str,
        period_days: i64,
    ) -> AppResult<BorrowRecord> {
        let (min, max) = (self.config.min_period_days, self.config.max_period_days);
        if !(min..=max).contains(&period_days) {
            return Err(AppError::InvalidArgument(format!(
                "Borrowing period must be between {} and {} days, got {}",
                min, max, period_days
            )));
        }

        let _guard = self.locks.acquire(book_id).await;

        let mut book = self
            .store
            .get_book(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
        ensure_counts(&book)?;

        if !book.is_available() {
            return Err(AppError::Unavailable(format!(
                "No copies of '{}' are available for borrowing",
                book.title
            )));
        }

        let now = self.clock.now();
        let before = book.clone();
        book.available_copies -= 1;
        book.updated_at = now;
        self.persist_book(&book).await?;

        let inserted = self
            .store
            .insert_borrow_record(NewBorrowRecord {
                book_id,
                borrower_name: borrower_name.to_string(),
                borrower_email: borrower_email.to_string(),
                borrow_date: now,
                due_date: now + Duration::days(period_days),
            })
            .await;

        let record = match inserted {
            Ok(record) => record,
            Err(e) => {
                // The copy was never handed out; put it back before reporting.
                if let Err(restore) = self.store.save_book(&before).await {
                    tracing::error!(
                        book_id,
                        "Failed to restore availability after aborted borrow: {}",
                        restore
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            record_id = record.id,
            book_id,
            available = book.available_copies,
            due = %record.due_date,
            "Book borrowed"
        );
        Ok(record)
    }

    /// Close a loan and put the copy back on the shelf
    pub async fn return_book(&self, record_id: i32) -> AppResult<BorrowRecord> {
        let book_id = self.get_record(record_id).await?.book_id;
        let _guard = self.locks.acquire(book_id).await;

        let mut record = self.get_record(record_id).await?;
        if record.is_returned() {
            return Err(AppError::AlreadyReturned(format!(
                "Borrow record {} has already been returned",
                record_id
            )));
        }

        let mut book = self.store.get_book(book_id).await?.ok_or_else(|| {
            AppError::InternalConsistency(format!(
                "Borrow record {} references missing book {}",
                record_id, book_id
            ))
        })?;
        ensure_counts(&book)?;
        if book.available_copies >= book.total_copies {
            return Err(AppError::InternalConsistency(format!(
                "Book {} has all {} copies on the shelf but record {} is still out",
                book_id, book.total_copies, record_id
            )));
        }

        let now = self.clock.now();
        let before = book.clone();
        book.available_copies += 1;
        book.updated_at = now;
        self.persist_book(&book).await?;

        record.return_date = Some(now);
        if let Err(e) = self.persist_record(&record).await {
            if let Err(restore) = self.store.save_book(&before).await {
                tracing::error!(
                    book_id,
                    "Failed to restore availability after aborted return: {}",
                    restore
                );
            }
            return Err(e);
        }

        tracing::info!(
            record_id,
            book_id,
            available = book.available_copies,
            "Book returned"
        );
        Ok(record)
    }

    /// Push the due date of an outstanding loan back by `additional_days`
    pub async fn extend(&self, record_id: i32, additional_days: i64) -> AppResult<BorrowRecord> {
        let max = self.config.max_extension_days;
        if additional_days <= 0 || additional_days > max {
            return Err(AppError::InvalidArgument(format!(
                "Extension must be between 1 and {} days, got {}",
                max, additional_days
            )));
        }

        let book_id = self.get_record(record_id).await?.book_id;
        let _guard = self.locks.acquire(book_id).await;

        let mut record = self.get_record(record_id).await?;
        if record.is_returned() {
            return Err(AppError::AlreadyReturned(format!(
                "Cannot extend borrow record {}: already returned",
                record_id
            )));
        }

        record.due_date += Duration::days(additional_days);
        self.persist_record(&record).await?;

        tracing::info!(record_id, additional_days, due = %record.due_date, "Due date extended");
        Ok(record)
    }

    /// Status of `record` at `now`
    pub fn status_of(record: &BorrowRecord, now: DateTime<Utc>) -> BorrowStatus {
        record.status_at(now)
    }

    /// Outstanding records due strictly before `now`, most overdue first
    pub async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowRecord>> {
        let filter = BorrowFilter {
            returned: Some(false),
            due_before: Some(now),
            ..BorrowFilter::default()
        };
        let mut records = self.store.query_borrow_records(&filter).await?;
        records.sort_by_key(|r| (r.due_date, r.id));
        Ok(records)
    }

    pub async fn get_record(&self, record_id: i32) -> AppResult<BorrowRecord> {
        self.store
            .get_borrow_record(record_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Borrow record with id {} not found", record_id))
            })
    }

    /// Paginated borrow listing, newest borrow first
    pub async fn list_records(&self, query: &BorrowQuery, page: PageRequest) -> AppResult<BorrowPage> {
        let now = self.clock.now();
        let filter = match query.status {
            None => BorrowFilter::default(),
            Some(BorrowStatusFilter::Borrowed) => BorrowFilter::outstanding(),
            Some(BorrowStatusFilter::Returned) => BorrowFilter {
                returned: Some(true),
                ..BorrowFilter::default()
            },
            Some(BorrowStatusFilter::Overdue) => BorrowFilter {
                returned: Some(false),
                due_before: Some(now),
                ..BorrowFilter::default()
            },
        };

        let mut records = self.store.query_borrow_records(&filter).await?;

        if let Some(needle) = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
        {
            records.retain(|r| {
                r.borrower_name.to_lowercase().contains(&needle)
                    || r.borrower_email.to_lowercase().contains(&needle)
            });
        }

        records.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date).then(b.id.cmp(&a.id)));

        let pagination = Pagination::new(page, records.len() as i64);
        let borrows = page
            .slice(records)
            .into_iter()
            .map(|r| BorrowDetails::at(r, now))
            .collect();

        Ok(BorrowPage {
            borrows,
            pagination,
        })
    }

    /// Every record of one borrower, newest first
    pub async fn borrower_history(&self, borrower_email: &str) -> AppResult<Vec<BorrowRecord>> {
        let filter = BorrowFilter {
            borrower_email: Some(borrower_email.to_string()),
            ..BorrowFilter::default()
        };
        let mut records = self.store.query_borrow_records(&filter).await?;
        records.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    pub async fn loan_counts(&self, now: DateTime<Utc>) -> AppResult<LoanCounts> {
        let outstanding = self
            .store
            .query_borrow_records(&BorrowFilter::outstanding())
            .await?;
        let overdue = outstanding
            .iter()
            .filter(|r| r.status_at(now) == BorrowStatus::ActiveOverdue)
            .count();
        Ok(LoanCounts {
            active: outstanding.len() as i64,
            overdue: overdue as i64,
        })
    }

    async fn persist_book(&self, book: &Book) -> AppResult<()> {
        if !self.store.save_book(book).await? {
            return Err(AppError::InternalConsistency(format!(
                "Book {} disappeared while locked",
                book.id
            )));
        }
        Ok(())
    }

    async fn persist_record(&self, record: &BorrowRecord) -> AppResult<()> {
        if !self.store.save_borrow_record(record).await? {
            return Err(AppError::InternalConsistency(format!(
                "Borrow record {} disappeared while locked",
                record.id
            )));
        }
        Ok(())
    }
}

fn ensure_counts(book: &Book) -> AppResult<()> {
    if book.counts_consistent() {
        Ok(())
    } else {
        Err(AppError::InternalConsistency(format!(
            "Book {} has {} available of {} copies",
            book.id, book.available_copies, book.total_copies
        )))
    }
}
