//! Inventory reservation engine.
//!
//! A reservation batch is all-or-nothing: every line is checked under a row
//! lock first, and stock is only touched once the whole batch is known to fit.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use common::OrderId;
use domain::ProductId;
use serde::{Deserialize, Serialize};
use store::{InventoryRecord, OutboxRecord, ReservationLine, Store, StoreTransaction};

use crate::error::{Result, SagaError};

/// One line to reserve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    pub order_id: OrderId,
}

impl ReservationRequest {
    pub fn new(order_id: OrderId, product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            order_id,
        }
    }
}

/// Outcome of a reservation batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResult {
    pub is_successful: bool,
    /// Why the first unsatisfiable line could not be reserved.
    pub failure_reason: Option<String>,
    /// Every product that could not be reserved, in request order.
    pub unavailable_products: Vec<ProductId>,
}

impl ReservationResult {
    fn reserved() -> Self {
        Self {
            is_successful: true,
            failure_reason: None,
            unavailable_products: Vec::new(),
        }
    }

    fn reject(&mut self, product_id: &ProductId, reason: String) {
        self.is_successful = false;
        self.failure_reason.get_or_insert(reason);
        if !self.unavailable_products.contains(product_id) {
            self.unavailable_products.push(product_id.clone());
        }
    }
}

/// An on-hand change that would leave negative stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidAdjustment {
    pub product_id: ProductId,
    pub quantity_on_hand: i64,
    pub change: i64,
}

impl fmt::Display for InvalidAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Adjustment of {} would leave product {} with negative stock (on hand: {})",
            self.change, self.product_id, self.quantity_on_hand
        )
    }
}

/// Result of [`ReservationEngine::adjust_on_hand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentOutcome {
    Adjusted(InventoryRecord),
    Rejected(InvalidAdjustment),
}

/// Reserves, releases and adjusts stock.
#[derive(Clone)]
pub struct ReservationEngine {
    store: Arc<dyn Store>,
}

impl ReservationEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Reserves a batch in a transaction of its own.
    #[tracing::instrument(skip(self, requests), fields(lines = requests.len()))]
    pub async fn reserve(&self, requests: &[ReservationRequest]) -> Result<ReservationResult> {
        let mut tx = self.store.begin().await?;
        let result = Self::reserve_in(tx.as_mut(), requests).await?;
        if result.is_successful {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(result)
    }

    /// Reserves a batch inside the caller's transaction.
    ///
    /// A rejected batch writes nothing, so the caller may carry on with the
    /// transaction either way.
    pub async fn reserve_in(
        tx: &mut dyn StoreTransaction,
        requests: &[ReservationRequest],
    ) -> Result<ReservationResult> {
        if let Some(bad) = requests.iter().find(|r| r.quantity <= 0) {
            return Err(SagaError::invalid(format!(
                "Quantity for product {} must be greater than 0",
                bad.product_id
            )));
        }

        let mut result = ReservationResult::reserved();
        let mut working: HashMap<ProductId, InventoryRecord> = HashMap::new();

        // Check every line before writing anything so the result names all
        // unavailable products.
        for request in requests {
            if !working.contains_key(&request.product_id) {
                match tx.inventory_for_update(&request.product_id).await? {
                    Some(record) => {
                        working.insert(request.product_id.clone(), record);
                    }
                    None => {
                        result.reject(
                            &request.product_id,
                            format!("Product {} not found in inventory", request.product_id),
                        );
                        continue;
                    }
                }
            }

            let Some(record) = working.get_mut(&request.product_id) else {
                continue;
            };
            let available = record.available();
            if available < request.quantity {
                result.reject(
                    &request.product_id,
                    format!(
                        "Insufficient inventory for product {}. Available: {}, Requested: {}",
                        request.product_id, available, request.quantity
                    ),
                );
                continue;
            }
            record.quantity_reserved += request.quantity;
        }

        if !result.is_successful {
            tracing::warn!(
                reason = result.failure_reason.as_deref().unwrap_or_default(),
                unavailable = result.unavailable_products.len(),
                "inventory reservation failed"
            );
            metrics::counter!("inventory_reservations_total", "outcome" => "rejected").increment(1);
            return Ok(result);
        }

        let now = Utc::now();
        for record in working.values_mut() {
            record.last_updated = now;
            tx.save_inventory(record).await?;
        }
        for request in requests {
            tx.record_reservation(&ReservationLine::new(
                request.order_id.clone(),
                request.product_id.clone(),
                request.quantity,
            ))
            .await?;
            tracing::info!(
                order_id = %request.order_id,
                product_id = %request.product_id,
                quantity = request.quantity,
                "inventory reserved"
            );
        }

        metrics::counter!("inventory_reservations_total", "outcome" => "reserved").increment(1);
        Ok(result)
    }

    /// Gives back everything still reserved for an order.
    ///
    /// Returns true if any reservation was released; calling it again is a no-op.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn release(&self, order_id: &OrderId) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let released = Self::release_in(tx.as_mut(), order_id).await?;
        tx.commit().await?;
        Ok(released)
    }

    /// Releases inside the caller's transaction.
    pub async fn release_in(tx: &mut dyn StoreTransaction, order_id: &OrderId) -> Result<bool> {
        let lines = tx.open_reservations(order_id).await?;
        if lines.is_empty() {
            tracing::debug!(%order_id, "nothing to release");
            return Ok(false);
        }

        for line in &lines {
            let Some(mut record) = tx.inventory_for_update(&line.product_id).await? else {
                tracing::warn!(product_id = %line.product_id, "reserved product has no inventory record");
                continue;
            };
            record.quantity_reserved = (record.quantity_reserved - line.quantity).max(0);
            record.last_updated = Utc::now();
            tx.save_inventory(&record).await?;
            tracing::info!(
                %order_id,
                product_id = %line.product_id,
                quantity = line.quantity,
                "inventory released"
            );
        }
        tx.mark_released(order_id).await?;

        metrics::counter!("inventory_reservations_total", "outcome" => "released").increment(1);
        Ok(true)
    }

    pub async fn get(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        let mut tx = self.store.begin_read().await?;
        let record = tx.inventory(product_id).await?;
        tx.commit().await?;
        Ok(record)
    }

    pub async fn low_stock(&self) -> Result<Vec<InventoryRecord>> {
        let mut tx = self.store.begin_read().await?;
        let records = tx.low_stock().await?;
        tx.commit().await?;
        Ok(records)
    }

    /// Changes on-hand stock by `change` and writes an audit record.
    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    pub async fn adjust_on_hand(
        &self,
        product_id: &ProductId,
        change: i64,
        reason: &str,
    ) -> Result<AdjustmentOutcome> {
        let mut tx = self.store.begin().await?;
        let Some(mut record) = tx.inventory_for_update(product_id).await? else {
            return Err(SagaError::InventoryNotFound(product_id.clone()));
        };

        let new_quantity = record.quantity_on_hand.checked_add(change).unwrap_or(-1);
        if new_quantity < 0 {
            tx.rollback().await?;
            let rejected = InvalidAdjustment {
                product_id: product_id.clone(),
                quantity_on_hand: record.quantity_on_hand,
                change,
            };
            tracing::warn!(%rejected, "inventory adjustment rejected");
            return Ok(AdjustmentOutcome::Rejected(rejected));
        }

        record.quantity_on_hand = new_quantity;
        record.last_updated = Utc::now();
        tx.save_inventory(&record).await?;
        tx.append_outbox(&OutboxRecord::new(
            product_id.as_str(),
            "InventoryAdjustment",
            serde_json::json!({
                "productId": product_id,
                "quantityChange": change,
                "newQuantity": new_quantity,
                "reason": reason,
            }),
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(change, new_quantity, reason, "inventory adjusted");
        Ok(AdjustmentOutcome::Adjusted(record))
    }
}
