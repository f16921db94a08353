//! HTTP surface: the popularity read endpoint, the signal-changing write
//! endpoints that owe the cache an invalidation, and the health and metrics
//! endpoints.

pub mod popular;
pub mod writes;

use crate::error::CakeRankError;
use crate::metrics::SharedMetrics;
use crate::popularity::PopularityCache;
use crate::services::store::RecordWriter;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<PopularityCache>,
    pub writer: Arc<dyn RecordWriter>,
    pub metrics: SharedMetrics,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/popular", get(popular::popular_handler))
        .route("/api/cakes/popular", get(popular::popular_handler))
        .route("/orders", post(writes::place_order))
        .route("/orders/{id}/status", patch(writes::set_order_status))
        .route("/comments", post(writes::add_comment))
        .route(
            "/comments/{id}",
            put(writes::update_comment).delete(writes::delete_comment),
        )
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// JSON error body: `{ success: false, message }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Client errors keep their own message; anything else is logged and
    /// reported with the route's generic failure message.
    pub fn from_error(err: CakeRankError, failure_message: &str) -> Self {
        match err {
            CakeRankError::Validation(message) => Self {
                status: StatusCode::BAD_REQUEST,
                message,
            },
            CakeRankError::NotFound(message) => Self {
                status: StatusCode::NOT_FOUND,
                message,
            },
            other => {
                error!(error = %other, "Request failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: failure_message.to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "message": self.message })),
        )
            .into_response()
    }
}

/// Record request metrics for a finished response
pub(crate) fn observe(
    metrics: &SharedMetrics,
    route: &str,
    start: Instant,
    response: Response,
) -> Response {
    metrics.record_request(
        route,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

/// Metrics endpoint handler
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(snapshot) = state.cache.snapshot() {
        state.metrics.update_snapshot_metrics(Some(snapshot.as_ref()));
    }
    if let Some(age) = state.cache.snapshot_age() {
        state.metrics.set_snapshot_age(age.as_secs_f64());
    }

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Health check endpoint
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.cache.snapshot();

    let body = json!({
        "status": "healthy",
        "snapshot": snapshot.is_some(),
        "snapshot_entries": snapshot.as_ref().map(|s| s.entries.len()),
        "snapshot_built_at": snapshot.as_ref().map(|s| s.built_at.to_rfc3339()),
        "snapshot_age_seconds": state.cache.snapshot_age().map(|age| age.as_secs()),
        "ttl_seconds": state.cache.config().ttl.as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    });

    (
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}
