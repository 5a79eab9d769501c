//! Domain error types.

use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the order aggregate.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The caller cancelled the operation before it finished.
    #[error("{operation} was cancelled")]
    Cancelled { operation: &'static str },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Runs `fut` unless `cancel` fires first.
pub(crate) async fn or_cancelled<T>(
    cancel: &CancellationToken,
    operation: &'static str,
    fut: impl Future<Output = T>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DomainError::Cancelled { operation }),
        value = fut => Ok(value),
    }
}
