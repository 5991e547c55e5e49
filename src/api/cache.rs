//! HTTP caching around read handlers, plus cache administration endpoints
//!
//! Reads go through [`cached_json`]: a fresh entry is served with `X-Cache: HIT`, a
//! matching `If-None-Match` gets `304 Not Modified`, and a miss computes the value,
//! stores it and serves it with `X-Cache: MISS`. Writes commit first, then call
//! [`invalidate`], and answer with [`no_store`] headers.

use std::future::Future;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Duration;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    services::cache::{CacheFamily, CacheLookup, ResponseCache},
    AppState,
};

/// Key family of every book read
pub const BOOKS: &str = "books";
/// Key family of every borrow record read
pub const BORROWS: &str = "borrows";

const X_CACHE: &str = "x-cache";

/// Entity tags sent by the client in `If-None-Match`, unquoted
fn client_fingerprints(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|tag| tag.trim().trim_start_matches("W/").trim_matches('"').to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

fn lookup(cache: &ResponseCache, key: &str, client_tags: &[String]) -> CacheLookup {
    if client_tags.is_empty() {
        return cache.get(key);
    }
    let mut last = CacheLookup::Miss;
    for tag in client_tags {
        match cache.get_if_match(key, tag) {
            found @ CacheLookup::NotModified { .. } => return found,
            other => last = other,
        }
    }
    last
}

/// Seconds a downstream cache may keep an entry stored `age_secs` ago
fn remaining_max_age(ttl: Duration, age_secs: i64) -> i64 {
    (ttl.num_seconds() - age_secs.max(0)).max(0)
}

fn set_cache_headers(headers: &mut HeaderMap, fingerprint: &str, max_age: i64) {
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", fingerprint)) {
        headers.insert(header::ETAG, etag);
    }
    if let Ok(control) = HeaderValue::from_str(&format!("public, max-age={}", max_age)) {
        headers.insert(header::CACHE_CONTROL, control);
    }
}

fn not_modified(fingerprint: &str, max_age: i64) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    set_cache_headers(response.headers_mut(), fingerprint, max_age);
    response
}

fn json_body(payload: Vec<u8>, fingerprint: &str, max_age: i64, state: &'static str) -> Response {
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        payload,
    )
        .into_response();
    let headers = response.headers_mut();
    set_cache_headers(headers, fingerprint, max_age);
    headers.insert(HeaderName::from_static(X_CACHE), HeaderValue::from_static(state));
    response
}

/// Serve a cacheable read
pub async fn cached_json<T, F, Fut>(
    cache: &ResponseCache,
    key: String,
    family: CacheFamily,
    headers: &HeaderMap,
    compute: F,
) -> AppResult<Response>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let ttl = cache.ttl(family);
    let client_tags = client_fingerprints(headers);

    match lookup(cache, &key, &client_tags) {
        CacheLookup::NotModified {
            fingerprint,
            age_secs,
        } => {
            tracing::debug!(key = %key, "Cache 304 Not Modified");
            return Ok(not_modified(&fingerprint, remaining_max_age(ttl, age_secs)));
        }
        CacheLookup::Hit(value) => {
            tracing::debug!(key = %key, age = value.age_secs, "Cache HIT");
            let max_age = remaining_max_age(ttl, value.age_secs);
            let mut response = json_body(value.payload.to_vec(), &value.fingerprint, max_age, "HIT");
            response
                .headers_mut()
                .insert(header::AGE, HeaderValue::from(value.age_secs.max(0)));
            return Ok(response);
        }
        CacheLookup::Miss => {}
    }

    let ticket = cache.ticket();
    let value = compute().await?;
    let payload = serde_json::to_vec(&value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize response: {}", e)))?;
    let fingerprint = cache.put_after(ticket, &key, payload.clone(), ttl);
    tracing::debug!(key = %key, "Cache MISS");

    if client_tags.iter().any(|tag| *tag == fingerprint) {
        return Ok(not_modified(&fingerprint, ttl.num_seconds()));
    }
    Ok(json_body(payload, &fingerprint, ttl.num_seconds(), "MISS"))
}

/// Mark a response as never cacheable
pub fn no_store(response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}

/// Drop every cached read of the given families. Call after the write committed.
pub fn invalidate(cache: &ResponseCache, families: &[&str]) {
    for family in families {
        cache.invalidate(family);
    }
}

/// Cache status response
#[derive(Serialize, ToSchema)]
pub struct CacheStatusResponse {
    pub enabled: bool,
    /// Number of stored entries, fresh or not yet purged
    pub cached_entries: usize,
    pub cache_keys: Vec<String>,
}

/// Cache clear response
#[derive(Serialize, ToSchema)]
pub struct CacheClearResponse {
    pub cleared: usize,
    pub message: String,
}

/// Inspect the response cache
#[utoipa::path(
    get,
    path = "/cache/status",
    tag = "cache",
    responses(
        (status = 200, description = "Cache contents", body = CacheStatusResponse)
    )
)]
pub async fn cache_status(State(state): State<AppState>) -> Response {
    let status = state.services.cache.status();
    no_store(Json(CacheStatusResponse {
        enabled: status.enabled,
        cached_entries: status.entries,
        cache_keys: status.keys,
    }))
}

/// Drop every cached response
#[utoipa::path(
    post,
    path = "/cache/clear",
    tag = "cache",
    responses(
        (status = 200, description = "Cache cleared", body = CacheClearResponse)
    )
)]
pub async fn clear_cache(State(state): State<AppState>) -> Response {
    let cleared = state.services.cache.clear();
    tracing::info!(cleared, "Response cache cleared");
    no_store(Json(CacheClearResponse {
        cleared,
        message: "Cache cleared".to_string(),
    }))
}
