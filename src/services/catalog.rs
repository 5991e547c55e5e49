//! Catalog service: book administration and availability queries
//!
//! Always computes a fresh answer; response caching happens in the API layer.

use std::sync::Arc;

use validator::Validate;

use crate::{
    api::stats::StatsResponse,
    error::{AppError, AppResult},
    models::{
        book::{BookQuery, CreateBook, UpdateBook},
        Book, BookPage, BorrowFilter, NewBook, PageRequest, Pagination,
    },
    repository::Store,
};

use super::ledger::LendingLedger;

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    ledger: LendingLedger,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, ledger: LendingLedger) -> Self {
        Self { store, ledger }
    }

    /// Storage reachability, for readiness probes
    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }

    /// Filtered, paginated listing ordered by id
    pub async fn list_books(&self, query: &BookQuery, page: PageRequest) -> AppResult<BookPage> {
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        let available_only = query.available_only.unwrap_or(false);

        let mut books: Vec<Book> = self
            .store
            .list_books()
            .await?
            .into_iter()
            .filter(|b| needle.as_deref().map_or(true, |n| b.matches_text(n)))
            .filter(|b| !available_only || b.is_available())
            .collect();
        books.sort_by_key(|b| b.id);

        let pagination = Pagination::new(page, books.len() as i64);
        Ok(BookPage {
            books: page.slice(books),
            pagination,
        })
    }

    /// Case-insensitive match on title or author. A blank query finds nothing.
    pub async fn search(&self, query: &str) -> AppResult<Vec<Book>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut books: Vec<Book> = self
            .store
            .list_books()
            .await?
            .into_iter()
            .filter(|b| b.matches_text(&needle))
            .collect();
        books.sort_by_key(|b| b.id);
        Ok(books)
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.store
            .get_book(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        let isbn = book.isbn.trim().to_string();

        if self.store.find_book_by_isbn(&isbn).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Book with ISBN {} already exists",
                isbn
            )));
        }

        let created = self
            .store
            .insert_book(NewBook {
                title: book.title.trim().to_string(),
                author: book.author.trim().to_string(),
                isbn,
                total_copies: book.total_copies.unwrap_or(1),
                created_at: self.ledger.now(),
            })
            .await?;

        tracing::info!(book_id = created.id, isbn = %created.isbn, "Book created");
        Ok(created)
    }

    /// Update bibliographic fields. Availability is left to the ledger.
    pub async fn update_book(&self, id: i32, update: UpdateBook) -> AppResult<Book> {
        update.validate()?;

        let _guard = self.ledger.lock_book(id).await;
        let mut book = self.get_book(id).await?;

        if let Some(isbn) = update.isbn.as_deref().map(str::trim) {
            if isbn != book.isbn {
                if let Some(existing) = self.store.find_book_by_isbn(isbn).await? {
                    return Err(AppError::Conflict(format!(
                        "Book with ISBN {} already exists (id={})",
                        isbn, existing.id
                    )));
                }
                book.isbn = isbn.to_string();
            }
        }
        if let Some(title) = update.title {
            book.title = title.trim().to_string();
        }
        if let Some(author) = update.author {
            book.author = author.trim().to_string();
        }
        book.updated_at = self.ledger.now();

        if !self.store.save_book(&book).await? {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(book)
    }

    /// Delete a book that has no copy on loan
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        let _guard = self.ledger.lock_book(id).await;
        let book = self.get_book(id).await?;

        let outstanding = self
            .store
            .query_borrow_records(&BorrowFilter {
                book_id: Some(id),
                ..BorrowFilter::outstanding()
            })
            .await?;
        if book.on_loan() > 0 || !outstanding.is_empty() {
            return Err(AppError::Conflict(format!(
                "Cannot delete '{}': {} copies are currently borrowed",
                book.title,
                outstanding.len().max(book.on_loan() as usize)
            )));
        }

        self.store.delete_book(id).await?;
        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }

    /// Real-time holdings and loan figures
    pub async fn stats(&self) -> AppResult<StatsResponse> {
        let books = self.store.list_books().await?;
        let now = self.ledger.now();
        let loans = self.ledger.loan_counts(now).await?;

        let total_copies: i64 = books.iter().map(|b| b.total_copies as i64).sum();
        let available_copies: i64 = books.iter().map(|b| b.available_copies as i64).sum();

        Ok(StatsResponse {
            titles: books.len() as i64,
            total_copies,
            available_copies,
            borrowed_copies: total_copies - available_copies,
            active_loans: loans.active,
            overdue_loans: loans.overdue,
            generated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::LendingConfig,
        repository::{seed_sample_books, MemoryStore},
        services::clock::{Clock, ManualClock},
    };
    use chrono::{Duration, TimeZone, Utc};

    async fn setup() -> (CatalogService, LendingLedger, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));
        seed_sample_books(store.as_ref(), clock.now()).await.unwrap();
        let ledger = LendingLedger::new(store.clone(), clock.clone(), LendingConfig::default());
        (CatalogService::new(store, ledger.clone()), ledger, clock)
    }

    fn new_book(title: &str, isbn: &str) -> CreateBook {
        CreateBook {
            title: title.to_string(),
            author: "Someone".to_string(),
            isbn: isbn.to_string(),
            total_copies: Some(2),
        }
    }

    #[tokio::test]
    async fn test_blank_search_returns_nothing() {
        let (catalog, _ledger, _clock) = setup().await;
        assert!(catalog.search("").await.unwrap().is_empty());
        assert!(catalog.search("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_on_title_and_author() {
        let (catalog, _ledger, _clock) = setup().await;
        let by_title = catalog.search("clean CODE").await.unwrap();
        assert_eq!(by_title.len(), 1);
        let by_author = catalog.search("fowler").await.unwrap();
        assert_eq!(by_author[0].title, "Refactoring");
    }

    #[tokio::test]
    async fn test_list_books_pages_in_id_order() {
        let (catalog, _ledger, _clock) = setup().await;
        let page = PageRequest { page: 2, per_page: 5 };
        let result = catalog.list_books(&BookQuery::default(), page).await.unwrap();
        assert_eq!(result.pagination.total, 8);
        assert_eq!(result.pagination.pages, 2);
        let ids: Vec<i32> = result.books.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![6, 7, 8]);
    }

    #[tokio::test]
    async fn test_available_only_hides_fully_borrowed_books() {
        let (catalog, ledger, _clock) = setup().await;
        // Design Patterns has a single copy
        let design_patterns = catalog.search("design patterns").await.unwrap().remove(0);
        ledger
            .borrow(design_patterns.id, "Jane", "jane@x.com", 14)
            .await
            .unwrap();

        let query = BookQuery {
            available_only: Some(true),
            ..BookQuery::default()
        };
        let page = PageRequest { page: 1, per_page: 15 };
        let result = catalog.list_books(&query, page).await.unwrap();
        assert_eq!(result.pagination.total, 7);
        assert!(result.books.iter().all(|b| b.id != design_patterns.id));
    }

    #[tokio::test]
    async fn test_duplicate_isbn_is_a_conflict() {
        let (catalog, _ledger, _clock) = setup().await;
        let err = catalog.create_book(new_book("Clone", "0132350882")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let created = catalog.create_book(new_book("Fresh", "9999999999")).await.unwrap();
        assert_eq!(created.available_copies, 2);
        let err = catalog
            .update_book(
                created.id,
                UpdateBook {
                    title: None,
                    author: None,
                    isbn: Some("0201485672".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_concurrent_creates_of_one_isbn_yield_one_book() {
        let (catalog, _ledger, _clock) = setup().await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let catalog = catalog.clone();
            handles.push(tokio::spawn(async move {
                catalog
                    .create_book(new_book(&format!("Copy {}", i), "5555555555"))
                    .await
            }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, AppError::Conflict(_)), "unexpected error: {}", e),
            }
        }
        assert_eq!(created, 1);
        let matching = catalog
            .list_books(&BookQuery::default(), PageRequest { page: 1, per_page: 15 })
            .await
            .unwrap()
            .books
            .into_iter()
            .filter(|b| b.isbn == "5555555555")
            .count();
        assert_eq!(matching, 1);
    }

    #[tokio::test]
    async fn test_invalid_book_is_rejected() {
        let (catalog, _ledger, _clock) = setup().await;
        let err = catalog.create_book(new_book("", "12345")).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_delete_refused_while_on_loan() {
        let (catalog, ledger, _clock) = setup().await;
        let book = catalog.create_book(new_book("Loaned", "1111111111")).await.unwrap();
        let record = ledger.borrow(book.id, "Jane", "jane@x.com", 14).await.unwrap();

        let err = catalog.delete_book(book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        ledger.return_book(record.id).await.unwrap();
        catalog.delete_book(book.id).await.unwrap();
        assert!(matches!(
            catalog.get_book(book.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_stats_reflect_loans() {
        let (catalog, ledger, clock) = setup().await;
        let clean_code = catalog.search("clean code").await.unwrap().remove(0);
        ledger.borrow(clean_code.id, "Jane", "jane@x.com", 7).await.unwrap();
        ledger.borrow(clean_code.id, "John", "john@x.com", 30).await.unwrap();
        clock.advance(Duration::days(8));

        let stats = catalog.stats().await.unwrap();
        assert_eq!(stats.titles, 8);
        assert_eq!(stats.borrowed_copies, 2);
        assert_eq!(stats.available_copies, stats.total_copies - 2);
        assert_eq!(stats.active_loans, 2);
        assert_eq!(stats.overdue_loans, 1);
    }
}
