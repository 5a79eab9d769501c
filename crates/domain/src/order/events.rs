//! Order domain events.
//!
//! Every command on [`Order`](super::Order) returns the events it produced; the
//! caller persists them (the order-event outbox) in the same transaction as the
//! state change.

use chrono::{DateTime, Utc};
use common::{CorrelationId, OrderId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{CustomerId, Money, OrderItem, OrderStatus, ProductId, SupplierId};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was accepted at intake.
    OrderReceived(OrderReceivedData),

    /// Item was added to the order.
    ItemAdded(ItemAddedData),

    /// Item was removed from the order.
    ItemRemoved(ItemRemovedData),

    /// Item quantity was updated.
    ItemQuantityUpdated(ItemQuantityUpdatedData),

    /// Order moved between two pipeline stages.
    StatusChanged(StatusChangedData),

    /// Supplier was assigned and the order confirmed.
    OrderConfirmed(OrderConfirmedData),

    /// A pipeline stage failed the order.
    OrderFailed(OrderFailedData),

    /// Order was cancelled.
    OrderCancelled(OrderCancelledData),

    /// Order was delivered.
    OrderDelivered(OrderDeliveredData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderReceived(_) => "OrderReceived",
            OrderEvent::ItemAdded(_) => "ItemAdded",
            OrderEvent::ItemRemoved(_) => "ItemRemoved",
            OrderEvent::ItemQuantityUpdated(_) => "ItemQuantityUpdated",
            OrderEvent::StatusChanged(_) => "StatusChanged",
            OrderEvent::OrderConfirmed(_) => "OrderConfirmed",
            OrderEvent::OrderFailed(_) => "OrderFailed",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::OrderDelivered(_) => "OrderDelivered",
        }
    }
}

/// Data for OrderReceived event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceivedData {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub correlation_id: Option<CorrelationId>,
    pub received_at: DateTime<Utc>,
}

/// Data for ItemAdded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemAddedData {
    /// The product that was added.
    pub product_id: ProductId,

    /// Product name.
    pub product_name: String,

    /// Quantity added.
    pub quantity: u32,

    /// Unit price at the time of adding.
    pub unit_price: Money,
}

/// Data for ItemRemoved event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRemovedData {
    /// The product that was removed.
    pub product_id: ProductId,
}

/// Data for ItemQuantityUpdated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemQuantityUpdatedData {
    /// The product whose quantity was updated.
    pub product_id: ProductId,

    /// Previous quantity.
    pub old_quantity: u32,

    /// New quantity.
    pub new_quantity: u32,
}

/// Data for StatusChanged event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_at: DateTime<Utc>,
}

/// Data for OrderConfirmed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfirmedData {
    pub order_id: OrderId,
    pub supplier_id: SupplierId,
    pub total: Money,
    pub confirmed_at: DateTime<Utc>,
}

/// Data for OrderFailed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFailedData {
    /// Status the order was in when it failed.
    pub stage: OrderStatus,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Data for OrderCancelled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    /// When the order was cancelled.
    pub cancelled_at: DateTime<Utc>,

    /// Reason for cancellation.
    pub reason: String,
}

/// Data for OrderDelivered event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDeliveredData {
    pub delivered_at: DateTime<Utc>,
}

// Convenience constructors for events
impl OrderEvent {
    /// Creates an OrderReceived event.
    pub fn order_received(
        order_id: OrderId,
        customer_id: CustomerId,
        correlation_id: Option<CorrelationId>,
    ) -> Self {
        OrderEvent::OrderReceived(OrderReceivedData {
            order_id,
            customer_id,
            correlation_id,
            received_at: Utc::now(),
        })
    }

    /// Creates an ItemAdded event.
    pub fn item_added(item: &OrderItem) -> Self {
        OrderEvent::ItemAdded(ItemAddedData {
            product_id: item.product_id.clone(),
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
        })
    }

    /// Creates an ItemRemoved event.
    pub fn item_removed(product_id: ProductId) -> Self {
        OrderEvent::ItemRemoved(ItemRemovedData { product_id })
    }

    /// Creates an ItemQuantityUpdated event.
    pub fn item_quantity_updated(
        product_id: ProductId,
        old_quantity: u32,
        new_quantity: u32,
    ) -> Self {
        OrderEvent::ItemQuantityUpdated(ItemQuantityUpdatedData {
            product_id,
            old_quantity,
            new_quantity,
        })
    }

    /// Creates a StatusChanged event.
    pub fn status_changed(from: OrderStatus, to: OrderStatus) -> Self {
        OrderEvent::StatusChanged(StatusChangedData {
            from,
            to,
            changed_at: Utc::now(),
        })
    }

    /// Creates an OrderConfirmed event.
    pub fn order_confirmed(order_id: OrderId, supplier_id: SupplierId, total: Money) -> Self {
        OrderEvent::OrderConfirmed(OrderConfirmedData {
            order_id,
            supplier_id,
            total,
            confirmed_at: Utc::now(),
        })
    }

    /// Creates an OrderFailed event.
    pub fn order_failed(stage: OrderStatus, reason: impl Into<String>) -> Self {
        OrderEvent::OrderFailed(OrderFailedData {
            stage,
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }

    /// Creates an OrderCancelled event.
    pub fn order_cancelled(reason: impl Into<String>) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            cancelled_at: Utc::now(),
            reason: reason.into(),
        })
    }

    /// Creates an OrderDelivered event.
    pub fn order_delivered() -> Self {
        OrderEvent::OrderDelivered(OrderDeliveredData {
            delivered_at: Utc::now(),
        })
    }
}
