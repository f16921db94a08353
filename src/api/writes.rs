//! Write endpoints that change a popularity signal.
//!
//! Each handler persists through the record writer first and calls the
//! cache's invalidation hook only once that write has succeeded.

use crate::api::{observe, ApiError, AppState};
use crate::error::CakeRankError;
use crate::model::{validate_rating, CommentPatch, NewComment, NewOrder, OrderStatus};
use crate::popularity::WriteEvent;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

fn payload<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, CakeRankError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| CakeRankError::Validation(rejection.body_text()))
}

fn respond(
    state: &AppState,
    route: &str,
    start: Instant,
    status: StatusCode,
    result: Result<Value, CakeRankError>,
    failure_message: &str,
) -> Response {
    let response = match result {
        Ok(data) => (status, Json(json!({ "success": true, "data": data }))).into_response(),
        Err(e) => ApiError::from_error(e, failure_message).into_response(),
    };
    observe(&state.metrics, route, start, response)
}

/// `POST /orders`
pub async fn place_order(
    State(state): State<AppState>,
    body: Result<Json<NewOrder>, JsonRejection>,
) -> Response {
    let start = Instant::now();
    let result = try_place_order(&state, body).await;
    respond(&state, "place_order", start, StatusCode::CREATED, result, "Failed to place order")
}

async fn try_place_order(
    state: &AppState,
    body: Result<Json<NewOrder>, JsonRejection>,
) -> Result<Value, CakeRankError> {
    let order = payload(body)?;
    if order.items.is_empty() {
        return Err(CakeRankError::Validation(
            "Order must contain at least one item".to_string(),
        ));
    }
    if order.items.iter().any(|item| item.quantity == 0) {
        return Err(CakeRankError::Validation(
            "Item quantity must be at least 1".to_string(),
        ));
    }

    let id = state.writer.place_order(order).await?;
    state.cache.invalidate_after(WriteEvent::OrderPlaced);
    Ok(json!({ "id": id }))
}

/// `PATCH /orders/{id}/status`
pub async fn set_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Response {
    let start = Instant::now();
    let result = try_set_order_status(&state, order_id, body).await;
    respond(&state, "set_order_status", start, StatusCode::OK, result, "Failed to update order")
}

async fn try_set_order_status(
    state: &AppState,
    order_id: String,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Value, CakeRankError> {
    let update = payload(body)?;
    let status: OrderStatus = update.status.parse().map_err(CakeRankError::Validation)?;

    if !state.writer.set_order_status(&order_id, status).await? {
        return Err(CakeRankError::NotFound("Order not found".to_string()));
    }
    state.cache.invalidate_after(WriteEvent::OrderStatusChanged);
    Ok(json!({ "id": order_id, "status": status }))
}

/// `POST /comments`
pub async fn add_comment(
    State(state): State<AppState>,
    body: Result<Json<NewComment>, JsonRejection>,
) -> Response {
    let start = Instant::now();
    let result = try_add_comment(&state, body).await;
    respond(&state, "add_comment", start, StatusCode::CREATED, result, "Failed to add comment")
}

async fn try_add_comment(
    state: &AppState,
    body: Result<Json<NewComment>, JsonRejection>,
) -> Result<Value, CakeRankError> {
    let comment = payload(body)?;
    if comment.text.trim().is_empty() {
        return Err(CakeRankError::Validation(
            "Comment text is required".to_string(),
        ));
    }
    validate_rating(comment.rating).map_err(CakeRankError::Validation)?;

    let id = state.writer.add_comment(comment).await?;
    state.cache.invalidate_after(WriteEvent::CommentAdded);
    Ok(json!({ "id": id }))
}

/// `PUT /comments/{id}`
pub async fn update_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    body: Result<Json<CommentPatch>, JsonRejection>,
) -> Response {
    let start = Instant::now();
    let result = try_update_comment(&state, comment_id, body).await;
    respond(&state, "update_comment", start, StatusCode::OK, result, "Failed to update comment")
}

async fn try_update_comment(
    state: &AppState,
    comment_id: String,
    body: Result<Json<CommentPatch>, JsonRejection>,
) -> Result<Value, CakeRankError> {
    let patch = payload(body)?;
    validate_rating(patch.rating).map_err(CakeRankError::Validation)?;

    if !state.writer.update_comment(&comment_id, patch).await? {
        return Err(CakeRankError::NotFound("Comment not found".to_string()));
    }
    state.cache.invalidate_after(WriteEvent::CommentUpdated);
    Ok(json!({ "id": comment_id }))
}

/// `DELETE /comments/{id}`
pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
) -> Response {
    let start = Instant::now();
    let result = try_delete_comment(&state, comment_id).await;
    respond(&state, "delete_comment", start, StatusCode::OK, result, "Failed to delete comment")
}

async fn try_delete_comment(state: &AppState, comment_id: String) -> Result<Value, CakeRankError> {
    if !state.writer.delete_comment(&comment_id).await? {
        return Err(CakeRankError::NotFound("Comment not found".to_string()));
    }
    state.cache.invalidate_after(WriteEvent::CommentDeleted);
    Ok(json!({ "id": comment_id }))
}
