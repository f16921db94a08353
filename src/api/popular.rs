use crate::api::{observe, ApiError, AppState};
use crate::error::CakeRankError;
use crate::model::ProductSignal;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const DEFAULT_LIMIT: usize = 8;
pub const MAX_LIMIT: usize = 20;

const LIMIT_MESSAGE: &str = "Limit must be between 1 and 20";
const FAILURE_MESSAGE: &str = "Failed to fetch popular cakes";

#[derive(Debug, Default, Deserialize)]
pub struct PopularParams {
    pub limit: Option<String>,
}

#[derive(Serialize)]
struct PopularResponse<'a> {
    success: bool,
    data: &'a [ProductSignal],
    count: usize,
    cached: bool,
}

/// Missing or empty `limit` means the default; anything else must be an
/// integer in `[1, MAX_LIMIT]`.
pub fn parse_limit(raw: Option<&str>) -> Result<usize, CakeRankError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_LIMIT),
        Some(raw) => raw,
    };

    match raw.parse::<i64>() {
        Ok(limit) if (1..=MAX_LIMIT as i64).contains(&limit) => Ok(limit as usize),
        _ => Err(CakeRankError::Validation(LIMIT_MESSAGE.to_string())),
    }
}

/// `GET /popular?limit=<n>`
pub async fn popular_handler(
    State(state): State<AppState>,
    query: Result<Query<PopularParams>, QueryRejection>,
) -> Response {
    let start = Instant::now();

    // A query string that does not decode is reported like a bad limit
    let limit = match query {
        Ok(Query(params)) => parse_limit(params.limit.as_deref()),
        Err(_) => Err(CakeRankError::Validation(LIMIT_MESSAGE.to_string())),
    };
    let result = match limit {
        Ok(limit) => state.cache.get_top_n(limit).await,
        Err(e) => Err(e),
    };

    let response = match result {
        Ok(top) => Json(PopularResponse {
            success: true,
            data: top.entries(),
            count: top.entries().len(),
            cached: top.cached,
        })
        .into_response(),
        Err(e) => ApiError::from_error(e, FAILURE_MESSAGE).into_response(),
    };

    observe(&state.metrics, "popular", start, response)
}
