//! Bridge error types and retry classification.

use std::time::Duration;

use common::MessageId;
use domain::{DomainError, OrderError};
use saga::{PublishError, SagaError};
use store::StoreError;
use thiserror::Error;

/// Errors raised by a message broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker has been shut down.
    #[error("Broker is closed")]
    Closed,

    /// The delivery is not in flight on this subscription.
    #[error("Unknown delivery {message_id} on {topic}")]
    UnknownDelivery { message_id: MessageId, topic: String },

    /// A payload could not be encoded into an envelope.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while handling a pipeline message.
///
/// The broker's delivery count is the only retry budget: a handler returns
/// the error, and [`BridgeError::is_retryable`] decides between redelivery and
/// the dead-letter queue.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The message body or its type does not match what the stage expects.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// The processing API rejected the request as invalid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The processing API refused our credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The processing API does not know the order.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The order's state does not allow processing.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The processing API did not answer in time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The processing API answered with an unexpected status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never reached the processing API.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Saga error: {0}")]
    Saga(#[from] SagaError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),
}

impl BridgeError {
    /// Returns true if redelivering the message may succeed.
    ///
    /// Only malformed or invalid input is fatal. Everything else, including
    /// unknown orders and state conflicts, is retried until the delivery count
    /// runs out.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Malformed(_) | BridgeError::InvalidRequest(_) => false,
            BridgeError::Unauthorized(_)
            | BridgeError::NotFound(_)
            | BridgeError::Conflict(_)
            | BridgeError::Timeout(_)
            | BridgeError::Http { .. }
            | BridgeError::Transport(_)
            | BridgeError::Publish(_) => true,
            BridgeError::Saga(e) => !e.is_invalid_input(),
            BridgeError::Order(e) => e.is_state_conflict(),
            BridgeError::Domain(e) => matches!(e, DomainError::Cancelled { .. }),
            BridgeError::Store(e) => !matches!(
                e,
                StoreError::Serialization(_) | StoreError::Corrupt { .. } | StoreError::ReadOnly
            ),
            BridgeError::Broker(e) => !matches!(e, BrokerError::Serialization(_)),
        }
    }

    /// Short label used on metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Malformed(_) => "malformed",
            BridgeError::InvalidRequest(_) => "invalid_request",
            BridgeError::Unauthorized(_) => "unauthorized",
            BridgeError::NotFound(_) => "not_found",
            BridgeError::Conflict(_) => "conflict",
            BridgeError::Timeout(_) => "timeout",
            BridgeError::Http { .. } => "http",
            BridgeError::Transport(_) => "transport",
            BridgeError::Saga(_) => "saga",
            BridgeError::Domain(_) => "domain",
            BridgeError::Order(_) => "order",
            BridgeError::Store(_) => "store",
            BridgeError::Broker(_) => "broker",
            BridgeError::Publish(_) => "publish",
        }
    }
}

/// Result type for broker operations.
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Result type for stage handlers.
pub type Result<T> = std::result::Result<T, BridgeError>;
