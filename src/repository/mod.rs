//! Repository layer: the persistence interface and its backends

pub mod memory;
pub mod postgres;
pub mod seed;

use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{Book, BorrowFilter, BorrowRecord, NewBook, NewBorrowRecord},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use seed::seed_sample_books;

/// Persistence interface for books and borrow records.
///
/// Each call is transactional at the single-record level; multi-record sequences
/// are serialized by the lending ledger, not by the store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap connectivity check used by the readiness probe
    async fn ping(&self) -> AppResult<()>;

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>>;

    async fn find_book_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>>;

    /// All books ordered by id
    async fn list_books(&self) -> AppResult<Vec<Book>>;

    /// Store a new book with every copy available
    async fn insert_book(&self, book: NewBook) -> AppResult<Book>;

    /// Overwrite an existing book. Returns false if the id is unknown.
    async fn save_book(&self, book: &Book) -> AppResult<bool>;

    /// Returns false if the id is unknown
    async fn delete_book(&self, id: i32) -> AppResult<bool>;

    async fn get_borrow_record(&self, id: i32) -> AppResult<Option<BorrowRecord>>;

    async fn insert_borrow_record(&self, record: NewBorrowRecord) -> AppResult<BorrowRecord>;

    /// Overwrite an existing record. Returns false if the id is unknown.
    async fn save_borrow_record(&self, record: &BorrowRecord) -> AppResult<bool>;

    /// Records matching `filter`, ordered by id
    async fn query_borrow_records(&self, filter: &BorrowFilter) -> AppResult<Vec<BorrowRecord>>;
}
