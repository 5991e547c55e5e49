//! In-process store backed by ordered maps

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Store;
use crate::{
    error::{AppError, AppResult},
    models::{Book, BorrowFilter, BorrowRecord, NewBook, NewBorrowRecord},
};

fn duplicate_isbn(isbn: &str) -> AppError {
    AppError::Conflict(format!("Book with ISBN {} already exists", isbn))
}

#[derive(Default)]
struct State {
    books: BTreeMap<i32, Book>,
    records: BTreeMap<i32, BorrowRecord>,
    next_book_id: i32,
    next_record_id: i32,
}

/// Store kept entirely in memory; contents die with the process
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.state.read().await.books.get(&id).cloned())
    }

    async fn find_book_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let state = self.state.read().await;
        Ok(state.books.values().find(|b| b.isbn == isbn).cloned())
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        Ok(self.state.read().await.books.values().cloned().collect())
    }

    /// ISBNs are unique, like the `books.isbn` constraint
    async fn insert_book(&self, book: NewBook) -> AppResult<Book> {
        let mut state = self.state.write().await;
        if state.books.values().any(|b| b.isbn == book.isbn) {
            return Err(duplicate_isbn(&book.isbn));
        }
        state.next_book_id += 1;
        let stored = Book {
            id: state.next_book_id,
            title: book.title,
            author: book.author,
            isbn: book.isbn,
            total_copies: book.total_copies,
            available_copies: book.total_copies,
            created_at: book.created_at,
            updated_at: book.created_at,
        };
        state.books.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn save_book(&self, book: &Book) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if state
            .books
            .values()
            .any(|b| b.id != book.id && b.isbn == book.isbn)
        {
            return Err(duplicate_isbn(&book.isbn));
        }
        match state.books.get_mut(&book.id) {
            Some(slot) => {
                *slot = book.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_book(&self, id: i32) -> AppResult<bool> {
        Ok(self.state.write().await.books.remove(&id).is_some())
    }

    async fn get_borrow_record(&self, id: i32) -> AppResult<Option<BorrowRecord>> {
        Ok(self.state.read().await.records.get(&id).cloned())
    }

    async fn insert_borrow_record(&self, record: NewBorrowRecord) -> AppResult<BorrowRecord> {
        let mut state = self.state.write().await;
        state.next_record_id += 1;
        let stored = BorrowRecord {
            id: state.next_record_id,
            book_id: record.book_id,
            borrower_name: record.borrower_name,
            borrower_email: record.borrower_email,
            borrow_date: record.borrow_date,
            due_date: record.due_date,
            return_date: None,
        };
        state.records.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn save_borrow_record(&self, record: &BorrowRecord) -> AppResult<bool> {
        let mut state = self.state.write().await;
        match state.records.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn query_borrow_records(&self, filter: &BorrowFilter) -> AppResult<Vec<BorrowRecord>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}
