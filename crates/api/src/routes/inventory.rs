//! Stock queries, adjustments and reservations.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::ProductId;
use saga::{AdjustmentOutcome, ReservationRequest, ReservationResult};
use serde::Deserialize;
use store::InventoryRecord;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustInventoryRequest {
    pub quantity_change: i64,
    #[serde(default)]
    pub reason: String,
}

/// GET /inventory/{productId}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
) -> Result<Json<InventoryRecord>, ApiError> {
    let product_id = ProductId::new(product_id);
    state
        .inventory
        .get(&product_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Inventory not found for product {product_id}")))
}

/// GET /inventory/low-stock
#[tracing::instrument(skip(state))]
pub async fn low_stock(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<InventoryRecord>>, ApiError> {
    Ok(Json(state.inventory.low_stock().await?))
}

/// PATCH /inventory/{productId}: change on-hand stock by a signed delta.
#[tracing::instrument(skip(state, req), fields(change = req.quantity_change))]
pub async fn adjust(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
    Json(req): Json<AdjustInventoryRequest>,
) -> Result<Json<InventoryRecord>, ApiError> {
    let outcome = state
        .inventory
        .adjust_on_hand(&ProductId::new(product_id), req.quantity_change, &req.reason)
        .await?;
    match outcome {
        AdjustmentOutcome::Adjusted(record) => Ok(Json(record)),
        AdjustmentOutcome::Rejected(rejected) => Err(ApiError::BadRequest(rejected.to_string())),
    }
}

/// POST /inventory/reserve
///
/// A rejected reservation is still a 200; the body says why.
#[tracing::instrument(skip(state, requests), fields(lines = requests.len()))]
pub async fn reserve(
    State(state): State<Arc<AppState>>,
    Json(requests): Json<Vec<ReservationRequest>>,
) -> Result<Json<ReservationResult>, ApiError> {
    if requests.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one reservation line is required".to_string(),
        ));
    }
    Ok(Json(state.inventory.reserve(&requests).await?))
}

/// DELETE /inventory/reserve/{orderId}
#[tracing::instrument(skip(state))]
pub async fn release(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let order_id = OrderId::new(order_id);
    if state.inventory.release(&order_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "No reservations held for order {order_id}"
        )))
    }
}
