//! Saga error types.

use common::OrderId;
use domain::{DomainError, OrderError, ProductId};
use store::StoreError;
use thiserror::Error;

use crate::services::PublishError;

/// Errors that can occur during orchestration.
///
/// Rejected reservations and failed pipeline stages are not errors; they end
/// up as a `Failed` order. These variants are what callers must react to.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The product has no inventory record.
    #[error("Inventory not found for product {0}")]
    InventoryNotFound(ProductId),

    /// The request failed shape validation.
    #[error("Invalid request: {}", .0.join("; "))]
    InvalidRequest(Vec<String>),

    /// The order aggregate rejected a command.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Publishing a message failed.
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

impl SagaError {
    pub fn invalid(message: impl Into<String>) -> Self {
        SagaError::InvalidRequest(vec![message.into()])
    }

    /// Returns true if the order's current status does not allow the command.
    pub fn is_state_conflict(&self) -> bool {
        matches!(self, SagaError::Order(e) if e.is_state_conflict())
    }

    /// Returns true if the error names something that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SagaError::OrderNotFound(_) | SagaError::InventoryNotFound(_)
        )
    }

    /// Returns true if the input itself is at fault and retrying cannot help.
    pub fn is_invalid_input(&self) -> bool {
        match self {
            SagaError::InvalidRequest(_) => true,
            SagaError::Order(e) => !e.is_state_conflict(),
            _ => false,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
