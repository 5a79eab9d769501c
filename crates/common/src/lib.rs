//! Shared identifier types for the order orchestration workspace.

mod types;

pub use types::{CorrelationId, MessageId, OrderId};
