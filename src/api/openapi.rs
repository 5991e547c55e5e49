//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, borrows, cache, health, stats};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library API",
        version = "1.0.0",
        description = "Book catalog and lending REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::search_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Borrows
        borrows::list_borrows,
        borrows::list_overdue,
        borrows::get_borrow,
        borrows::borrower_history,
        borrows::create_borrow,
        borrows::return_borrow,
        borrows::extend_borrow,
        // Stats
        stats::get_stats,
        // Cache
        cache::cache_status,
        cache::clear_cache,
    ),
    components(
        schemas(
            // Books
            crate::models::Book,
            crate::models::BookPage,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            books::BookResponse,
            // Borrows
            crate::models::BorrowDetails,
            crate::models::BorrowPage,
            crate::models::BorrowStatus,
            crate::models::borrow::BorrowStatusFilter,
            crate::models::borrow::CreateBorrow,
            crate::models::borrow::ExtendBorrow,
            borrows::BorrowResponse,
            crate::models::Pagination,
            // Stats
            stats::StatsResponse,
            // Cache
            cache::CacheStatusResponse,
            cache::CacheClearResponse,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Book catalog"),
        (name = "borrows", description = "Lending ledger"),
        (name = "stats", description = "Statistics"),
        (name = "cache", description = "Response cache administration")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
