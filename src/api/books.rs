//! Book catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        book::{BookQuery, CreateBook, SearchQuery, UpdateBook},
        Book, BookPage, PageRequest,
    },
    services::cache::CacheFamily,
    AppState,
};

use super::cache::{cached_json, invalidate, no_store, BOOKS};

/// Book write response
#[derive(Serialize, ToSchema)]
pub struct BookResponse {
    pub book: Book,
    pub message: String,
}

/// List books
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "One page of books ordered by id", body = BookPage),
        (status = 304, description = "Client copy is still fresh")
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BookQuery>,
) -> AppResult<Response> {
    let page = PageRequest::normalize(query.page, query.per_page, &state.config.pagination);
    let search = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default();
    let key = format!(
        "{}:list?search={}&available_only={}&page={}&per_page={}",
        BOOKS,
        search,
        query.available_only.unwrap_or(false),
        page.page,
        page.per_page
    );

    let catalog = &state.services.catalog;
    cached_json(&state.services.cache, key, CacheFamily::Collection, &headers, || {
        catalog.list_books(&query, page)
    })
    .await
}

/// Search books by title or author
#[utoipa::path(
    get,
    path = "/books/search",
    tag = "books",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching books, empty for a blank query", body = Vec<Book>)
    )
)]
pub async fn search_books(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> AppResult<Response> {
    let needle = query.q.unwrap_or_default().trim().to_lowercase();
    let key = format!("{}:search?q={}", BOOKS, needle);

    let catalog = &state.services.catalog;
    cached_json(&state.services.cache, key, CacheFamily::Search, &headers, || {
        catalog.search(&needle)
    })
    .await
}

/// Get book by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let key = format!("{}:item:{}", BOOKS, id);

    let catalog = &state.services.catalog;
    cached_json(&state.services.cache, key, CacheFamily::Item, &headers, || {
        catalog.get_book(id)
    })
    .await
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = BookResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "ISBN already in the catalog")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    Json(book): Json<CreateBook>,
) -> AppResult<Response> {
    let book = state.services.catalog.create_book(book).await?;
    invalidate(&state.services.cache, &[BOOKS]);

    Ok(no_store((
        StatusCode::CREATED,
        Json(BookResponse {
            book,
            message: "Book created successfully".to_string(),
        }),
    )))
}

/// Update a book's title, author or ISBN
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = BookResponse),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "ISBN already in the catalog")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(update): Json<UpdateBook>,
) -> AppResult<Response> {
    let book = state.services.catalog.update_book(id, update).await?;
    invalidate(&state.services.cache, &[BOOKS]);

    Ok(no_store(Json(BookResponse {
        book,
        message: "Book updated successfully".to_string(),
    })))
}

/// Remove a book with no copy on loan
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Copies are still on loan")
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    state.services.catalog.delete_book(id).await?;
    invalidate(&state.services.cache, &[BOOKS]);

    Ok(no_store(StatusCode::NO_CONTENT))
}
