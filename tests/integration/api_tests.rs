//! API integration tests
//!
//! Drive the full router in-process against the in-memory store and a manual clock.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use library_server::{
    api,
    config::AppConfig,
    repository::{seed_sample_books, MemoryStore},
    services::{
        clock::{Clock, ManualClock},
        Services,
    },
    AppState,
};

const CLEAN_CODE: i64 = 1;
const DESIGN_PATTERNS: i64 = 3;

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestResponse {
    fn etag(&self) -> String {
        self.headers
            .get(header::ETAG)
            .expect("ETag header")
            .to_str()
            .unwrap()
            .to_string()
    }

    fn x_cache(&self) -> &str {
        self.headers
            .get("x-cache")
            .map(|v| v.to_str().unwrap())
            .unwrap_or("")
    }
}

async fn spawn_app() -> TestApp {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));
    let store = Arc::new(MemoryStore::new());
    seed_sample_books(store.as_ref(), clock.now()).await.unwrap();

    let config = AppConfig::default();
    let services = Services::new(store, clock.clone(), &config);
    let router = api::create_router(AppState::new(config, services));
    TestApp { router, clock }
}

impl TestApp {
    async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        if_none_match: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("/api/v1{}", uri));
        if let Some(tag) = if_none_match {
            builder = builder.header(header::IF_NONE_MATCH, tag);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None, None).await
    }

    async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(body), None).await
    }

    async fn borrow(&self, book_id: i64, email: &str, days: Option<i64>) -> TestResponse {
        let mut body = json!({
            "book_id": book_id,
            "borrower_name": "Jane Reader",
            "borrower_email": email,
        });
        if let Some(days) = days {
            body["days"] = json!(days);
        }
        self.post("/borrows", body).await
    }
}

#[tokio::test]
async fn test_health_and_readiness() {
    let app = spawn_app().await;

    let health = app.get("/health").await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body["status"], "healthy");

    let ready = app.get("/ready").await;
    assert_eq!(ready.status, StatusCode::OK);
    assert_eq!(ready.body["status"], "ready");
}

#[tokio::test]
async fn test_borrow_and_return_flow() {
    let app = spawn_app().await;

    let borrowed = app.borrow(CLEAN_CODE, "jane@example.com", None).await;
    assert_eq!(borrowed.status, StatusCode::CREATED);
    assert_eq!(borrowed.body["borrow"]["status"], "ACTIVE");
    assert_eq!(borrowed.body["borrow"]["due_date"], "2024-03-15T09:00:00Z");
    let record_id = borrowed.body["borrow"]["id"].as_i64().unwrap();

    let book = app.get(&format!("/books/{}", CLEAN_CODE)).await;
    assert_eq!(book.body["available_copies"], 2);

    let returned = app
        .post(&format!("/borrows/{}/return", record_id), json!({}))
        .await;
    assert_eq!(returned.status, StatusCode::OK);
    assert_eq!(returned.body["borrow"]["status"], "RETURNED");

    let again = app
        .post(&format!("/borrows/{}/return", record_id), json!({}))
        .await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert_eq!(again.body["code"], 22);

    let book = app.get(&format!("/books/{}", CLEAN_CODE)).await;
    assert_eq!(book.body["available_copies"], 3);
}

#[tokio::test]
async fn test_last_copy_cannot_be_borrowed_twice() {
    let app = spawn_app().await;

    assert_eq!(
        app.borrow(DESIGN_PATTERNS, "a@example.com", None).await.status,
        StatusCode::CREATED
    );
    let second = app.borrow(DESIGN_PATTERNS, "b@example.com", None).await;
    assert_eq!(second.status, StatusCode::BAD_REQUEST);
    assert_eq!(second.body["code"], 7);
}

#[tokio::test]
async fn test_borrow_rejects_bad_input() {
    let app = spawn_app().await;

    let short = app.borrow(CLEAN_CODE, "jane@example.com", Some(3)).await;
    assert_eq!(short.status, StatusCode::BAD_REQUEST);
    assert_eq!(short.body["code"], 18);

    let bad_email = app.borrow(CLEAN_CODE, "not-an-email", None).await;
    assert_eq!(bad_email.status, StatusCode::BAD_REQUEST);

    let missing = app.borrow(999, "jane@example.com", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body["code"], 5);

    let book = app.get(&format!("/books/{}", CLEAN_CODE)).await;
    assert_eq!(book.body["available_copies"], 3);
}

#[tokio::test]
async fn test_cached_reads_and_conditional_requests() {
    let app = spawn_app().await;
    let uri = format!("/books/{}", CLEAN_CODE);

    let first = app.get(&uri).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.x_cache(), "MISS");
    let etag = first.etag();

    let second = app.get(&uri).await;
    assert_eq!(second.x_cache(), "HIT");
    assert_eq!(second.etag(), etag);
    assert_eq!(second.body, first.body);

    let revalidated = app.request(Method::GET, &uri, None, Some(&etag)).await;
    assert_eq!(revalidated.status, StatusCode::NOT_MODIFIED);
    assert_eq!(revalidated.body, Value::Null);

    let stale_tag = app
        .request(Method::GET, &uri, None, Some("\"0000000000000000\""))
        .await;
    assert_eq!(stale_tag.status, StatusCode::OK);
}

#[tokio::test]
async fn test_writes_invalidate_cached_reads() {
    let app = spawn_app().await;
    let uri = format!("/books/{}", CLEAN_CODE);

    let before = app.get(&uri).await;
    let list_before = app.get("/books").await;
    assert_eq!(before.body["available_copies"], 3);

    let borrowed = app.borrow(CLEAN_CODE, "jane@example.com", None).await;
    assert_eq!(
        borrowed.headers.get(header::CACHE_CONTROL).unwrap(),
        "no-store, no-cache, must-revalidate"
    );

    let after = app.get(&uri).await;
    assert_eq!(after.x_cache(), "MISS");
    assert_eq!(after.body["available_copies"], 2);
    assert_ne!(after.etag(), before.etag());

    // The old tag no longer matches once the content changed
    let revalidated = app
        .request(Method::GET, &uri, None, Some(&before.etag()))
        .await;
    assert_eq!(revalidated.status, StatusCode::OK);

    let list_after = app.get("/books").await;
    assert_eq!(list_after.x_cache(), "MISS");
    assert_ne!(list_after.body, list_before.body);
}

#[tokio::test]
async fn test_cache_entries_expire() {
    let app = spawn_app().await;

    let miss = app.get("/books/search?q=rust").await;
    assert_eq!(miss.x_cache(), "MISS");
    assert_eq!(miss.headers.get(header::CACHE_CONTROL).unwrap(), "public, max-age=60");

    app.clock.advance(Duration::seconds(45));
    let hit = app.get("/books/search?q=rust").await;
    assert_eq!(hit.x_cache(), "HIT");
    assert_eq!(hit.headers.get(header::AGE).unwrap(), "45");
    // A hit only grants what is left of the entry's lifetime
    assert_eq!(hit.headers.get(header::CACHE_CONTROL).unwrap(), "public, max-age=15");

    app.clock.advance(Duration::seconds(16));
    assert_eq!(app.get("/books/search?q=rust").await.x_cache(), "MISS");
}

#[tokio::test]
async fn test_search_and_listing() {
    let app = spawn_app().await;

    let blank = app.get("/books/search?q=").await;
    assert_eq!(blank.status, StatusCode::OK);
    assert_eq!(blank.body, json!([]));

    let found = app.get("/books/search?q=FOWLER").await;
    assert_eq!(found.body.as_array().unwrap().len(), 1);
    assert_eq!(found.body[0]["title"], "Refactoring");

    let page = app.get("/books?page=2&per_page=5").await;
    assert_eq!(page.body["books"].as_array().unwrap().len(), 3);
    assert_eq!(page.body["pagination"]["total"], 8);
    assert_eq!(page.body["pagination"]["has_prev"], true);
    assert_eq!(page.body["pagination"]["has_next"], false);

    // Unsupported page size falls back to the default
    let fallback = app.get("/books?per_page=7").await;
    assert_eq!(fallback.body["pagination"]["per_page"], 10);
}

#[tokio::test]
async fn test_listing_with_huge_page_number_is_empty() {
    let app = spawn_app().await;

    let books = app.get("/books?page=9223372036854775807").await;
    assert_eq!(books.status, StatusCode::OK);
    assert_eq!(books.body["books"], json!([]));
    assert_eq!(books.body["pagination"]["total"], 8);
    assert_eq!(books.body["pagination"]["has_next"], false);

    app.borrow(CLEAN_CODE, "jane@example.com", None).await;
    let borrows = app.get("/borrows?page=9223372036854775807&per_page=15").await;
    assert_eq!(borrows.status, StatusCode::OK);
    assert_eq!(borrows.body["borrows"], json!([]));
    assert_eq!(borrows.body["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_overdue_listing_follows_the_clock() {
    let app = spawn_app().await;

    app.borrow(CLEAN_CODE, "late@example.com", Some(7)).await;
    app.borrow(DESIGN_PATTERNS, "ontime@example.com", Some(30)).await;

    let none = app.get("/borrows/overdue").await;
    assert_eq!(none.body, json!([]));

    app.clock.advance(Duration::days(8));
    let overdue = app.get("/borrows/overdue").await;
    let records = overdue.body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["borrower_email"], "late@example.com");
    assert_eq!(records[0]["status"], "ACTIVE_OVERDUE");
    assert_eq!(records[0]["days_overdue"], 1);

    let stats = app.get("/stats").await;
    assert_eq!(stats.body["active_loans"], 2);
    assert_eq!(stats.body["overdue_loans"], 1);
    assert!(stats.headers.get("x-cache").is_none());
}

#[tokio::test]
async fn test_extend_borrow() {
    let app = spawn_app().await;
    let borrowed = app.borrow(CLEAN_CODE, "jane@example.com", Some(7)).await;
    let record_id = borrowed.body["borrow"]["id"].as_i64().unwrap();

    let zero = app
        .post(&format!("/borrows/{}/extend", record_id), json!({ "additional_days": 0 }))
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    let extended = app
        .post(&format!("/borrows/{}/extend", record_id), json!({ "additional_days": 7 }))
        .await;
    assert_eq!(extended.status, StatusCode::OK);
    assert_eq!(extended.body["borrow"]["due_date"], "2024-03-15T09:00:00Z");

    let missing = app
        .post("/borrows/999/extend", json!({ "additional_days": 7 }))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_borrow_listing_and_history() {
    let app = spawn_app().await;
    let first = app.borrow(CLEAN_CODE, "jane@example.com", None).await;
    app.clock.advance(Duration::hours(1));
    app.borrow(DESIGN_PATTERNS, "jane@example.com", None).await;
    app.borrow(CLEAN_CODE, "john@example.com", None).await;

    let first_id = first.body["borrow"]["id"].as_i64().unwrap();
    app.post(&format!("/borrows/{}/return", first_id), json!({}))
        .await;

    let history = app.get("/borrowers/JANE@example.com/borrows").await;
    let records = history.body.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["book_id"], DESIGN_PATTERNS);

    let returned = app.get("/borrows?status=returned").await;
    assert_eq!(returned.body["pagination"]["total"], 1);

    let borrowed = app.get("/borrows?status=borrowed").await;
    assert_eq!(borrowed.body["pagination"]["total"], 2);

    let single = app.get(&format!("/borrows/{}", first_id)).await;
    assert_eq!(single.body["status"], "RETURNED");
}

#[tokio::test]
async fn test_book_administration() {
    let app = spawn_app().await;

    let created = app
        .post(
            "/books",
            json!({ "title": "Working Effectively with Legacy Code", "author": "Michael Feathers", "isbn": "0131177052", "total_copies": 2 }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let book_id = created.body["book"]["id"].as_i64().unwrap();
    assert_eq!(created.body["book"]["available_copies"], 2);

    let duplicate = app
        .post(
            "/books",
            json!({ "title": "Copy", "author": "Someone", "isbn": "0131177052" }),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let updated = app
        .request(
            Method::PUT,
            &format!("/books/{}", book_id),
            Some(json!({ "title": "Legacy Code" })),
            None,
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["book"]["title"], "Legacy Code");

    let borrowed = app.borrow(book_id, "jane@example.com", None).await;
    let record_id = borrowed.body["borrow"]["id"].as_i64().unwrap();
    let refused = app
        .request(Method::DELETE, &format!("/books/{}", book_id), None, None)
        .await;
    assert_eq!(refused.status, StatusCode::CONFLICT);

    app.post(&format!("/borrows/{}/return", record_id), json!({}))
        .await;
    let deleted = app
        .request(Method::DELETE, &format!("/books/{}", book_id), None, None)
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(
        app.get(&format!("/books/{}", book_id)).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_cache_administration() {
    let app = spawn_app().await;
    app.get("/books").await;
    app.get(&format!("/books/{}", CLEAN_CODE)).await;

    let status = app.get("/cache/status").await;
    assert_eq!(status.body["enabled"], true);
    assert_eq!(status.body["cached_entries"], 2);

    let cleared = app.post("/cache/clear", json!({})).await;
    assert_eq!(cleared.body["cleared"], 2);

    let status = app.get("/cache/status").await;
    assert_eq!(status.body["cached_entries"], 0);
    assert_eq!(app.get("/books").await.x_cache(), "MISS");
}
