//! Postgres-backed store

use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder};

use super::Store;
use crate::{
    error::AppResult,
    models::{Book, BorrowFilter, BorrowRecord, NewBook, NewBorrowRecord},
};

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn find_book_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE isbn = $1")
            .bind(isbn)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>("SELECT * FROM books ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    async fn insert_book(&self, book: NewBook) -> AppResult<Book> {
        let stored = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, isbn, total_copies, available_copies, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(book.total_copies)
        .bind(book.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn save_book(&self, book: &Book) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = $1, author = $2, isbn = $3, total_copies = $4,
                available_copies = $5, updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(book.updated_at)
        .bind(book.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_book(&self, id: i32) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_borrow_record(&self, id: i32) -> AppResult<Option<BorrowRecord>> {
        let record = sqlx::query_as::<_, BorrowRecord>("SELECT * FROM borrow_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn insert_borrow_record(&self, record: NewBorrowRecord) -> AppResult<BorrowRecord> {
        let stored = sqlx::query_as::<_, BorrowRecord>(
            r#"
            INSERT INTO borrow_records (book_id, borrower_name, borrower_email, borrow_date, due_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(record.book_id)
        .bind(&record.borrower_name)
        .bind(&record.borrower_email)
        .bind(record.borrow_date)
        .bind(record.due_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn save_borrow_record(&self, record: &BorrowRecord) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE borrow_records SET due_date = $1, return_date = $2 WHERE id = $3",
        )
        .bind(record.due_date)
        .bind(record.return_date)
        .bind(record.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn query_borrow_records(&self, filter: &BorrowFilter) -> AppResult<Vec<BorrowRecord>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM borrow_records WHERE TRUE");

        if let Some(book_id) = filter.book_id {
            query.push(" AND book_id = ").push_bind(book_id);
        }
        if let Some(ref email) = filter.borrower_email {
            query
                .push(" AND lower(borrower_email) = lower(")
                .push_bind(email.clone())
                .push(")");
        }
        match filter.returned {
            Some(true) => {
                query.push(" AND return_date IS NOT NULL");
            }
            Some(false) => {
                query.push(" AND return_date IS NULL");
            }
            None => {}
        }
        if let Some(before) = filter.due_before {
            query.push(" AND due_date < ").push_bind(before);
        }
        query.push(" ORDER BY id");

        let records = query
            .build_query_as::<BorrowRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }
}
