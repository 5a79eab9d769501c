//! Persistent records other than the order itself.

use chrono::{DateTime, Utc};
use common::{MessageId, OrderId};
use domain::{DomainEvent, OrderEvent, ProductId, SupplierId};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Stock position for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    pub product_id: ProductId,
    pub quantity_on_hand: i64,
    #[serde(default)]
    pub quantity_reserved: i64,
    #[serde(default)]
    pub reorder_level: i64,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl InventoryRecord {
    pub fn new(product_id: impl Into<ProductId>, quantity_on_hand: i64, reorder_level: i64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity_on_hand,
            quantity_reserved: 0,
            reorder_level,
            last_updated: Utc::now(),
        }
    }

    /// Units that can still be reserved.
    pub fn available(&self) -> i64 {
        self.quantity_on_hand - self.quantity_reserved
    }

    pub fn is_low_stock(&self) -> bool {
        self.available() <= self.reorder_level
    }
}

/// A supplier and the products it sells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub products: Vec<ProductId>,
}

impl Supplier {
    pub fn sells_any(&self, products: &[ProductId]) -> bool {
        self.products.iter().any(|p| products.contains(p))
    }
}

fn default_true() -> bool {
    true
}

/// One reserved line in the reservation ledger.
///
/// `released_at` is set once the line has been given back, which is what
/// makes a second release a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub reserved_at: DateTime<Utc>,
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,
}

impl ReservationLine {
    pub fn new(order_id: OrderId, product_id: ProductId, quantity: i64) -> Self {
        Self {
            order_id,
            product_id,
            quantity,
            reserved_at: Utc::now(),
            released_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.released_at.is_none()
    }
}

/// A row of the order-event outbox, written in the same transaction as the
/// state change it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxRecord {
    pub id: MessageId,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl OutboxRecord {
    pub fn new(
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: MessageId::new(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            payload,
            created_at: Utc::now(),
        }
    }

    /// Wraps an order event produced by an aggregate command.
    pub fn for_order_event(order_id: &OrderId, event: &OrderEvent) -> Result<Self> {
        Ok(Self::new(
            order_id.as_str(),
            event.event_type(),
            serde_json::to_value(event)?,
        ))
    }
}

/// 1-based page of a newest-first listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub const DEFAULT_SIZE: u32 = 20;
    pub const MAX_SIZE: u32 = 100;

    /// Clamps the page number to at least 1 and the size to `1..=MAX_SIZE`.
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_SIZE)
    }
}

/// Supplier and stock data loaded at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSeed {
    #[serde(default)]
    pub suppliers: Vec<Supplier>,
    #[serde(default)]
    pub inventory: Vec<InventoryRecord>,
}
