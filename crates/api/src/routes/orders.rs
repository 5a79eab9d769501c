//! Order intake, queries, cancellation and the internal processing endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{CustomerId, Order, OrderResponse, ProcessOrderRequest, SupplierId};
use saga::CreateOrderRequest;
use serde::Deserialize;
use store::Page;

use crate::AppState;
use crate::error::ApiError;

const DEFAULT_CANCEL_REASON: &str = "Cancelled by customer";

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageParams {
    fn page(&self) -> Page {
        Page::new(
            self.page.unwrap_or(1),
            self.page_size.unwrap_or(Page::DEFAULT_SIZE),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelParams {
    pub reason: Option<String>,
}

/// POST /orders: accept an order and queue it for the pipeline.
#[tracing::instrument(skip(state, req), fields(customer_id = %req.customer_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let response = state.intake.create(req).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /orders/{id}: the full stored order.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state.intake.get(&OrderId::new(id)).await?;
    Ok(Json(order))
}

/// GET /orders/{id}/status
#[tracing::instrument(skip(state))]
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let response = state.intake.status(&OrderId::new(id)).await?;
    Ok(Json(response))
}

/// DELETE /orders/{id}?reason=...
#[tracing::instrument(skip(state, params))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<CancelParams>,
) -> Result<Json<OrderResponse>, ApiError> {
    let reason = params
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());
    let response = state
        .orchestrator
        .cancel(&OrderId::new(id), &reason)
        .await?;
    Ok(Json(response))
}

/// POST /orders/{id}: internal processing endpoint called by the pipeline bridge.
///
/// The order id in the path must match the one in the body; a body without an
/// id takes the path's.
#[tracing::instrument(skip(state, request))]
pub async fn process(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut request): Json<ProcessOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = OrderId::new(id);
    if request.order.id().is_empty() {
        request.order = with_id(request.order, &order_id)?;
    } else if request.order.id() != &order_id {
        return Err(ApiError::BadRequest(format!(
            "Order ID mismatch: path {order_id}, body {}",
            request.order.id()
        )));
    }

    let response = state.orchestrator.process(request).await?;
    Ok(Json(response))
}

/// GET /customers/{id}/orders?page=&page_size=
#[tracing::instrument(skip(state, params))]
pub async fn list_for_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state
        .intake
        .list_for_customer(&CustomerId::new(id), params.page())
        .await?;
    Ok(Json(orders))
}

/// GET /suppliers/{id}/orders?page=&page_size=
#[tracing::instrument(skip(state, params))]
pub async fn list_for_supplier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state
        .intake
        .list_for_supplier(&SupplierId::new(id), params.page())
        .await?;
    Ok(Json(orders))
}

/// Re-reads `order` with its id set, going through the wire shape so the
/// aggregate's invariants are re-established.
fn with_id(order: Order, id: &OrderId) -> Result<Order, ApiError> {
    let mut document =
        serde_json::to_value(&order).map_err(|e| ApiError::Internal(e.to_string()))?;
    document["id"] = serde_json::Value::from(id.as_str());
    serde_json::from_value(document).map_err(|e| ApiError::BadRequest(e.to_string()))
}
