//! API handlers for the library REST endpoints

pub mod books;
pub mod borrows;
pub mod cache;
pub mod health;
pub mod openapi;
pub mod stats;

use axum::{
    http::header,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Build the application router: the versioned API plus the OpenAPI docs
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::ETAG, header::CACHE_CONTROL, header::AGE]);

    let api_v1 = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/search", get(books::search_books))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route("/borrows", get(borrows::list_borrows).post(borrows::create_borrow))
        .route("/borrows/overdue", get(borrows::list_overdue))
        .route("/borrows/:id", get(borrows::get_borrow))
        .route("/borrows/:id/return", post(borrows::return_borrow))
        .route("/borrows/:id/extend", post(borrows::extend_borrow))
        .route("/borrowers/:email/borrows", get(borrows::borrower_history))
        .route("/stats", get(stats::get_stats))
        .route("/cache/status", get(cache::cache_status))
        .route("/cache/clear", post(cache::clear_cache))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
