//! Statistics endpoint

use axum::{extract::State, response::Response, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::AppResult, AppState};

use super::cache::no_store;

/// Holdings and loan figures at the time of the request
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Number of distinct books in the catalog
    pub titles: i64,
    pub total_copies: i64,
    pub available_copies: i64,
    pub borrowed_copies: i64,
    /// Borrow records not yet returned
    pub active_loans: i64,
    /// Outstanding records past their due date
    pub overdue_loans: i64,
    pub generated_at: DateTime<Utc>,
}

/// Get statistics. Never cached.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    responses(
        (status = 200, description = "Current statistics", body = StatsResponse)
    )
)]
pub async fn get_stats(State(state): State<AppState>) -> AppResult<Response> {
    let stats = state.services.catalog.stats().await?;
    Ok(no_store(Json(stats)))
}
