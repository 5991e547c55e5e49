//! Lending endpoints

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        borrow::{BorrowQuery, CreateBorrow, ExtendBorrow},
        BorrowDetails, BorrowPage, PageRequest,
    },
    services::cache::CacheFamily,
    AppState,
};

use super::cache::{cached_json, invalidate, no_store, BOOKS, BORROWS};

/// Borrow write response
#[derive(Serialize, ToSchema)]
pub struct BorrowResponse {
    pub borrow: BorrowDetails,
    pub message: String,
}

/// List borrow records, newest first
#[utoipa::path(
    get,
    path = "/borrows",
    tag = "borrows",
    params(BorrowQuery),
    responses(
        (status = 200, description = "One page of borrow records", body = BorrowPage)
    )
)]
pub async fn list_borrows(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BorrowQuery>,
) -> AppResult<Response> {
    let page = PageRequest::normalize(query.page, query.per_page, &state.config.pagination);
    let search = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default();
    let status = query
        .status
        .map(|s| format!("{:?}", s).to_lowercase())
        .unwrap_or_default();
    let key = format!(
        "{}:list?search={}&status={}&page={}&per_page={}",
        BORROWS, search, status, page.page, page.per_page
    );

    let ledger = &state.services.ledger;
    cached_json(&state.services.cache, key, CacheFamily::Aggregate, &headers, || {
        ledger.list_records(&query, page)
    })
    .await
}

/// Outstanding records past their due date, earliest due first
#[utoipa::path(
    get,
    path = "/borrows/overdue",
    tag = "borrows",
    responses(
        (status = 200, description = "Overdue borrow records", body = Vec<BorrowDetails>)
    )
)]
pub async fn list_overdue(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let key = format!("{}:overdue", BORROWS);

    let ledger = &state.services.ledger;
    cached_json(&state.services.cache, key, CacheFamily::Aggregate, &headers, || async move {
        let now = ledger.now();
        let records = ledger.list_overdue(now).await?;
        Ok::<_, AppError>(
            records
                .into_iter()
                .map(|record| BorrowDetails::at(record, now))
                .collect::<Vec<_>>(),
        )
    })
    .await
}

/// Get borrow record by ID
#[utoipa::path(
    get,
    path = "/borrows/{id}",
    tag = "borrows",
    params(
        ("id" = i32, Path, description = "Borrow record ID")
    ),
    responses(
        (status = 200, description = "Borrow record with its current status", body = BorrowDetails),
        (status = 404, description = "Borrow record not found")
    )
)]
pub async fn get_borrow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let key = format!("{}:item:{}", BORROWS, id);

    let ledger = &state.services.ledger;
    cached_json(&state.services.cache, key, CacheFamily::Aggregate, &headers, || async move {
        let record = ledger.get_record(id).await?;
        Ok::<_, AppError>(BorrowDetails::at(record, ledger.now()))
    })
    .await
}

/// Borrowing history of one borrower, newest first
#[utoipa::path(
    get,
    path = "/borrowers/{email}/borrows",
    tag = "borrows",
    params(
        ("email" = String, Path, description = "Borrower email")
    ),
    responses(
        (status = 200, description = "Borrow records of the borrower", body = Vec<BorrowDetails>)
    )
)]
pub async fn borrower_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(email): Path<String>,
) -> AppResult<Response> {
    let email = email.trim().to_lowercase();
    let key = format!("{}:history:{}", BORROWS, email);

    let ledger = &state.services.ledger;
    let email = &email;
    cached_json(&state.services.cache, key, CacheFamily::Aggregate, &headers, || async move {
        let now = ledger.now();
        let records = ledger.borrower_history(email).await?;
        Ok::<_, AppError>(
            records
                .into_iter()
                .map(|record| BorrowDetails::at(record, now))
                .collect::<Vec<_>>(),
        )
    })
    .await
}

/// Borrow a copy of a book
#[utoipa::path(
    post,
    path = "/borrows",
    tag = "borrows",
    request_body = CreateBorrow,
    responses(
        (status = 201, description = "Copy lent", body = BorrowResponse),
        (status = 400, description = "Invalid input or no copy available"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn create_borrow(
    State(state): State<AppState>,
    Json(request): Json<CreateBorrow>,
) -> AppResult<Response> {
    request.validate()?;

    let ledger = &state.services.ledger;
    let days = request.days.unwrap_or_else(|| ledger.default_period_days());
    let record = ledger
        .borrow(
            request.book_id,
            request.borrower_name.trim(),
            request.borrower_email.trim(),
            days,
        )
        .await?;
    invalidate(&state.services.cache, &[BOOKS, BORROWS]);

    let message = format!("Book borrowed successfully. Due {}", record.due_date.format("%Y-%m-%d"));
    Ok(no_store((
        StatusCode::CREATED,
        Json(BorrowResponse {
            borrow: BorrowDetails::at(record, ledger.now()),
            message,
        }),
    )))
}

/// Return a borrowed copy
#[utoipa::path(
    post,
    path = "/borrows/{id}/return",
    tag = "borrows",
    params(
        ("id" = i32, Path, description = "Borrow record ID")
    ),
    responses(
        (status = 200, description = "Copy returned", body = BorrowResponse),
        (status = 400, description = "Already returned"),
        (status = 404, description = "Borrow record not found")
    )
)]
pub async fn return_borrow(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let ledger = &state.services.ledger;
    let record = ledger.return_book(id).await?;
    invalidate(&state.services.cache, &[BOOKS, BORROWS]);

    Ok(no_store(Json(BorrowResponse {
        borrow: BorrowDetails::at(record, ledger.now()),
        message: "Book returned successfully".to_string(),
    })))
}

/// Push the due date of an outstanding record
#[utoipa::path(
    post,
    path = "/borrows/{id}/extend",
    tag = "borrows",
    params(
        ("id" = i32, Path, description = "Borrow record ID")
    ),
    request_body = ExtendBorrow,
    responses(
        (status = 200, description = "Due date extended", body = BorrowResponse),
        (status = 400, description = "Invalid extension or already returned"),
        (status = 404, description = "Borrow record not found")
    )
)]
pub async fn extend_borrow(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<ExtendBorrow>,
) -> AppResult<Response> {
    let ledger = &state.services.ledger;
    let record = ledger.extend(id, request.additional_days).await?;
    invalidate(&state.services.cache, &[BORROWS]);

    let message = format!(
        "Due date extended by {} days. New due date {}",
        request.additional_days,
        record.due_date.format("%Y-%m-%d")
    );
    Ok(no_store(Json(BorrowResponse {
        borrow: BorrowDetails::at(record, ledger.now()),
        message,
    })))
}
