//! Order aggregate and related types.

mod aggregate;
mod events;
mod metadata;
mod state;
mod value_objects;

pub use aggregate::{DEFAULT_HIGH_VALUE_THRESHOLD, Order};
pub use events::{
    ItemAddedData, ItemQuantityUpdatedData, ItemRemovedData, OrderCancelledData,
    OrderConfirmedData, OrderDeliveredData, OrderEvent, OrderFailedData, OrderReceivedData,
    StatusChangedData,
};
pub use metadata::OrderMetadata;
pub use state::OrderStatus;
pub use value_objects::{Currency, CustomerId, Money, OrderItem, ProductId, SupplierId};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Customer ID is required.
    #[error("Customer ID is required")]
    CustomerIdRequired,

    /// Order ID is required.
    #[error("Order ID is required")]
    OrderIdRequired,

    /// Order is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderStatus,
        action: &'static str,
    },

    /// Item not found in order.
    #[error("Item not found: {product_id}")]
    ItemNotFound { product_id: String },

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Invalid price.
    #[error("Invalid price: {price} cents (must be at least 1 cent)")]
    InvalidPrice { price: i64 },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Order is already created.
    #[error("Order already created")]
    AlreadyCreated,

    /// Currency code is not three ASCII letters.
    #[error("Invalid currency code: {code}")]
    InvalidCurrency { code: String },
}

impl OrderError {
    /// Returns true if the error means the order's current state forbids the action.
    pub fn is_state_conflict(&self) -> bool {
        matches!(self, OrderError::InvalidStateTransition { .. })
    }
}
