//! Message envelope shared by every topic.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{CorrelationId, MessageId};
use domain::{IntegrationEvent, Order};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, BrokerResult, Result};

/// Message type names carried in [`Envelope::message_type`].
pub mod message_types {
    pub const ORDER: &str = "Order";
    pub const ORDER_VALIDATION_RESPONSE: &str = "OrderValidationResponse";
    pub const ORDER_ENRICHMENT_RESPONSE: &str = "OrderEnrichmentResponse";
    pub const PROCESS_ORDER_REQUEST: &str = "ProcessOrderRequest";
}

/// A message as it travels through the broker.
///
/// The body is camelCase JSON; the other fields are the application
/// properties consumers route and correlate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub message_id: MessageId,
    pub correlation_id: CorrelationId,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
    pub source: String,
    pub body: Value,
}

impl Envelope {
    pub fn new(
        message_type: impl Into<String>,
        source: impl Into<String>,
        correlation_id: CorrelationId,
        body: Value,
    ) -> Self {
        Self {
            message_id: MessageId::new(),
            correlation_id,
            message_type: message_type.into(),
            created_at: Utc::now(),
            source: source.into(),
            body,
        }
    }

    /// Serializes `payload` into a new envelope.
    pub fn encode<T: Serialize>(
        message_type: &str,
        source: &str,
        correlation_id: CorrelationId,
        payload: &T,
    ) -> BrokerResult<Self> {
        Ok(Self::new(
            message_type,
            source,
            correlation_id,
            serde_json::to_value(payload)?,
        ))
    }

    /// Wraps an order for the first pipeline stage.
    pub fn for_order(order: &Order, source: &str) -> BrokerResult<Self> {
        Self::encode(
            message_types::ORDER,
            source,
            order.correlation_id().cloned().unwrap_or_default(),
            order,
        )
    }

    /// Wraps an integration event, keeping its id, type, source and correlation id.
    pub fn for_event(event: &IntegrationEvent) -> BrokerResult<Self> {
        let header = event.header();
        Ok(Self {
            message_id: header.id,
            correlation_id: header.correlation_id.clone(),
            message_type: header.event_type.clone(),
            created_at: header.created_at,
            source: header.source.clone(),
            body: event.to_json()?,
        })
    }

    /// Deserializes the body, treating a mismatch as malformed input.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.body.clone()).map_err(|e| {
            BridgeError::Malformed(format!(
                "{} message {} could not be read: {e}",
                self.message_type, self.message_id
            ))
        })
    }

    /// Returns true once the envelope has outlived `ttl`.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => self.created_at + ttl <= now,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use common::OrderId;
    use domain::{Aggregate, CustomerId, OrderFailedEvent};

    use super::*;

    fn order() -> Order {
        let mut order = Order::default();
        order
            .execute(|o| {
                o.create(
                    OrderId::new("ORD-1"),
                    CustomerId::new("CUST-001"),
                    Some(CorrelationId::from("corr-1")),
                )
            })
            .unwrap();
        order
    }

    #[test]
    fn order_envelope_carries_correlation_and_type() {
        let envelope = Envelope::for_order(&order(), "OrderIntake").unwrap();

        assert_eq!(envelope.message_type, message_types::ORDER);
        assert_eq!(envelope.correlation_id.as_str(), "corr-1");
        assert_eq!(envelope.body["id"], "ORD-1");

        let back: Order = envelope.decode().unwrap();
        assert_eq!(back.id().as_str(), "ORD-1");
    }

    #[test]
    fn event_envelope_reuses_header() {
        let event = IntegrationEvent::Failed(OrderFailedEvent::new(&order(), "boom", "Test"));
        let envelope = Envelope::for_event(&event).unwrap();

        assert_eq!(envelope.message_id, event.header().id);
        assert_eq!(envelope.message_type, "OrderFailedEvent");
        assert_eq!(envelope.source, "Test");
        assert_eq!(envelope.body["failureReason"], "boom");
    }

    #[test]
    fn wrong_body_is_malformed() {
        let envelope = Envelope::new(
            message_types::ORDER,
            "Test",
            CorrelationId::new(),
            Value::from("not an order"),
        );
        let err = envelope.decode::<Order>().unwrap_err();
        assert!(matches!(err, BridgeError::Malformed(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn expiry_is_measured_from_creation() {
        let envelope = Envelope::new("Test", "Test", CorrelationId::new(), Value::Null);
        let ttl = Duration::from_secs(60);

        assert!(!envelope.is_expired(ttl, envelope.created_at + chrono::Duration::seconds(59)));
        assert!(envelope.is_expired(ttl, envelope.created_at + chrono::Duration::seconds(60)));
    }
}
