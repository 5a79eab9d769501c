//! Cross-service message contracts.
//!
//! Stage messages flow between pipeline consumers; integration events announce
//! outcomes to anyone listening. Everything is camelCase JSON on the wire.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{CorrelationId, MessageId, OrderId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enrichment::EnrichmentResult;
use crate::order::{CustomerId, Money, Order, OrderStatus, SupplierId};
use crate::validation::ValidationResult;

/// Queue topic names, one per pipeline stage or event kind.
pub mod topics {
    pub const ORDER_RECEIVED: &str = "order-received";
    pub const ORDER_VALIDATED: &str = "order-validated";
    pub const ORDER_ENRICHED: &str = "order-enriched";
    pub const ORDER_PROCESSING: &str = "order-processing";
    pub const ORDER_CONFIRMED: &str = "order-confirmed";
    pub const ORDER_FAILED: &str = "order-failed";
    pub const ORDER_PROCESSED: &str = "order-processed";
    pub const HIGH_VALUE_ERRORS: &str = "high-value-errors";

    /// Every topic the pipeline uses.
    pub const ALL: [&str; 8] = [
        ORDER_RECEIVED,
        ORDER_VALIDATED,
        ORDER_ENRICHED,
        ORDER_PROCESSING,
        ORDER_CONFIRMED,
        ORDER_FAILED,
        ORDER_PROCESSED,
        HIGH_VALUE_ERRORS,
    ];

    /// Name of the dead-letter queue paired with `topic`.
    pub fn dead_letter(topic: &str) -> String {
        format!("{topic}.dlq")
    }
}

/// Order state as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl OrderResponse {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id().clone(),
            status: order.status(),
            message: order.status().status_message().to_string(),
            created_at: order.created_at(),
        }
    }
}

/// Published on `order-validated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderValidationResponse {
    pub order: Order,
    pub validation_result: ValidationResult,
    pub processed_at: DateTime<Utc>,
}

/// Published on `order-enriched`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEnrichmentResponse {
    pub order: Order,
    pub validation_result: ValidationResult,
    pub enrichment_result: EnrichmentResult,
    pub processed_at: DateTime<Utc>,
}

/// Published on `order-processing` and accepted by the internal process endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOrderRequest {
    pub order: Order,
    #[serde(default)]
    pub enrichment_data: BTreeMap<String, Value>,
    #[serde(default = "Utc::now")]
    pub processed_at: DateTime<Utc>,
}

impl ProcessOrderRequest {
    pub fn new(order: Order, enrichment_data: BTreeMap<String, Value>) -> Self {
        Self {
            order,
            enrichment_data,
            processed_at: Utc::now(),
        }
    }
}

/// Fields shared by every integration event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHeader {
    pub id: MessageId,
    pub created_at: DateTime<Utc>,
    pub event_type: String,
    pub source: String,
    #[serde(default)]
    pub correlation_id: CorrelationId,
}

impl EventHeader {
    pub fn new(event_type: &str, source: &str, correlation_id: CorrelationId) -> Self {
        Self {
            id: MessageId::new(),
            created_at: Utc::now(),
            event_type: event_type.to_string(),
            source: source.to_string(),
            correlation_id,
        }
    }
}

/// Customer tier derived from the value of the order at stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerTier {
    Premium,
    Gold,
    Silver,
    Standard,
}

impl CustomerTier {
    /// Premium above 5000, Gold above 2000, Silver above 500.
    pub fn from_order_value(value: Money) -> Self {
        match value.cents() {
            c if c > 500_000 => CustomerTier::Premium,
            c if c > 200_000 => CustomerTier::Gold,
            c if c > 50_000 => CustomerTier::Silver,
            _ => CustomerTier::Standard,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceivedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub received_at: DateTime<Utc>,
    pub source_system: String,
}

impl OrderReceivedEvent {
    pub fn new(order: &Order, source: &str) -> Self {
        Self {
            header: EventHeader::new(
                "OrderReceivedEvent",
                source,
                order.correlation_id().cloned().unwrap_or_default(),
            ),
            order_id: order.id().clone(),
            customer_id: order.customer_id().clone(),
            received_at: order.created_at(),
            source_system: order
                .metadata()
                .source_system
                .clone()
                .unwrap_or_else(|| source.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub order_id: OrderId,
    pub supplier_id: SupplierId,
    pub total_amount: Money,
    pub confirmed_at: DateTime<Utc>,
    pub processed_by: String,
}

impl OrderConfirmedEvent {
    pub fn new(order: &Order, supplier_id: SupplierId, source: &str) -> Self {
        Self {
            header: EventHeader::new(
                "OrderConfirmedEvent",
                source,
                order.correlation_id().cloned().unwrap_or_default(),
            ),
            order_id: order.id().clone(),
            supplier_id,
            total_amount: order.total_amount(),
            confirmed_at: order.confirmed_at().unwrap_or_else(Utc::now),
            processed_by: source.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub order_id: OrderId,
    pub failure_reason: String,
    #[serde(default)]
    pub error_details: Vec<String>,
    pub failed_at: DateTime<Utc>,
    pub is_retryable: bool,
}

impl OrderFailedEvent {
    pub fn new(order: &Order, failure_reason: impl Into<String>, source: &str) -> Self {
        Self {
            header: EventHeader::new(
                "OrderFailedEvent",
                source,
                order.correlation_id().cloned().unwrap_or_default(),
            ),
            order_id: order.id().clone(),
            failure_reason: failure_reason.into(),
            error_details: Vec::new(),
            failed_at: Utc::now(),
            is_retryable: false,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.error_details = details;
        self
    }
}

/// Escalation for failures that need human follow-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighValueErrorEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub customer_email: String,
    pub error_category: String,
    pub error_message: String,
    #[serde(default)]
    pub technical_details: String,
    pub order_value: Money,
    pub customer_tier: CustomerTier,
    pub error_occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    pub processing_stage: String,
    #[serde(default)]
    pub context_data: BTreeMap<String, Value>,
}

impl HighValueErrorEvent {
    pub fn new(
        order: &Order,
        error_category: impl Into<String>,
        error_message: impl Into<String>,
        processing_stage: &str,
    ) -> Self {
        let order_value = order.total_amount();
        Self {
            header: EventHeader::new(
                "HighValueErrorEvent",
                processing_stage,
                order.correlation_id().cloned().unwrap_or_default(),
            ),
            order_id: order.id().clone(),
            customer_id: order.customer_id().clone(),
            customer_email: order.customer_email().unwrap_or_default().to_string(),
            error_category: error_category.into(),
            error_message: error_message.into(),
            technical_details: String::new(),
            order_value,
            customer_tier: CustomerTier::from_order_value(order_value),
            error_occurred_at: Utc::now(),
            retry_count: 0,
            processing_stage: processing_stage.to_string(),
            context_data: BTreeMap::new(),
        }
    }

    pub fn with_technical_details(mut self, details: impl Into<String>) -> Self {
        self.technical_details = details.into();
        self
    }

    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context_data.insert(key.to_string(), value.into());
        self
    }
}

/// Announces that the processing endpoint accepted an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderProcessedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub processed_at: DateTime<Utc>,
    pub final_status: OrderStatus,
    pub processing_stage: String,
    #[serde(default)]
    pub processing_data: BTreeMap<String, Value>,
}

impl OrderProcessedEvent {
    pub fn new(order: &Order, response: &OrderResponse, source: &str) -> Self {
        let mut processing_data = BTreeMap::new();
        processing_data.insert("FinalMessage".to_string(), Value::from(response.message.clone()));
        processing_data.insert(
            "OrderValue".to_string(),
            Value::from(order.total_amount().as_decimal()),
        );
        processing_data.insert("ItemCount".to_string(), Value::from(order.item_count()));

        Self {
            header: EventHeader::new(
                "OrderProcessedEvent",
                source,
                order.correlation_id().cloned().unwrap_or_default(),
            ),
            order_id: order.id().clone(),
            customer_id: order.customer_id().clone(),
            processed_at: Utc::now(),
            final_status: response.status,
            processing_stage: "InternalSystemApi".to_string(),
            processing_data,
        }
    }
}

/// Any integration event, tagged with the topic it is announced on.
#[derive(Debug, Clone)]
pub enum IntegrationEvent {
    Received(OrderReceivedEvent),
    Confirmed(OrderConfirmedEvent),
    Failed(OrderFailedEvent),
    HighValueError(HighValueErrorEvent),
    Processed(OrderProcessedEvent),
}

impl IntegrationEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            IntegrationEvent::Received(_) => topics::ORDER_RECEIVED,
            IntegrationEvent::Confirmed(_) => topics::ORDER_CONFIRMED,
            IntegrationEvent::Failed(_) => topics::ORDER_FAILED,
            IntegrationEvent::HighValueError(_) => topics::HIGH_VALUE_ERRORS,
            IntegrationEvent::Processed(_) => topics::ORDER_PROCESSED,
        }
    }

    pub fn header(&self) -> &EventHeader {
        match self {
            IntegrationEvent::Received(e) => &e.header,
            IntegrationEvent::Confirmed(e) => &e.header,
            IntegrationEvent::Failed(e) => &e.header,
            IntegrationEvent::HighValueError(e) => &e.header,
            IntegrationEvent::Processed(e) => &e.header,
        }
    }

    pub fn order_id(&self) -> &OrderId {
        match self {
            IntegrationEvent::Received(e) => &e.order_id,
            IntegrationEvent::Confirmed(e) => &e.order_id,
            IntegrationEvent::Failed(e) => &e.order_id,
            IntegrationEvent::HighValueError(e) => &e.order_id,
            IntegrationEvent::Processed(e) => &e.order_id,
        }
    }

    /// The event body as sent on the wire.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        match self {
            IntegrationEvent::Received(e) => serde_json::to_value(e),
            IntegrationEvent::Confirmed(e) => serde_json::to_value(e),
            IntegrationEvent::Failed(e) => serde_json::to_value(e),
            IntegrationEvent::HighValueError(e) => serde_json::to_value(e),
            IntegrationEvent::Processed(e) => serde_json::to_value(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;
    use crate::order::{OrderItem, ProductId};

    fn order_worth(cents: i64) -> Order {
        let mut order = Order::default();
        order
            .execute(|o| {
                o.create(
                    OrderId::new("ORD-20240101-00000001"),
                    CustomerId::new("CUST-001"),
                    Some(CorrelationId::from("corr-7")),
                )
            })
            .unwrap();
        order
            .execute(|o| o.add_item(OrderItem::new(ProductId::new("P1"), "Widget", 1, Money::from_cents(cents))))
            .unwrap();
        order
    }

    #[test]
    fn tier_bands_are_exclusive_lower_bounds() {
        assert_eq!(CustomerTier::from_order_value(Money::from_dollars(6000)), CustomerTier::Premium);
        assert_eq!(CustomerTier::from_order_value(Money::from_dollars(5000)), CustomerTier::Gold);
        assert_eq!(CustomerTier::from_order_value(Money::from_dollars(2000)), CustomerTier::Silver);
        assert_eq!(CustomerTier::from_order_value(Money::from_dollars(500)), CustomerTier::Standard);
        assert_eq!(CustomerTier::from_order_value(Money::from_cents(50_001)), CustomerTier::Silver);
    }

    #[test]
    fn high_value_event_carries_tier_and_correlation() {
        let order = order_worth(600_000);
        let event = HighValueErrorEvent::new(&order, "PRODUCT_NOT_FOUND", "Product P1 not found", "Validation");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "HighValueErrorEvent");
        assert_eq!(json["correlationId"], "corr-7");
        assert_eq!(json["customerTier"], "Premium");
        assert_eq!(json["orderValue"], 6000.0);
        assert_eq!(json["processingStage"], "Validation");
    }

    #[test]
    fn events_route_to_their_topics() {
        let order = order_worth(1000);
        let failed = IntegrationEvent::Failed(OrderFailedEvent::new(&order, "x", "test"));
        assert_eq!(failed.topic(), topics::ORDER_FAILED);
        assert_eq!(failed.header().event_type, "OrderFailedEvent");
        assert_eq!(failed.to_json().unwrap()["failureReason"], "x");
        assert_eq!(topics::dead_letter(failed.topic()), "order-failed.dlq");
    }

    #[test]
    fn failed_event_is_not_retryable() {
        let order = order_worth(1000);
        let event = OrderFailedEvent::new(&order, "Cancelled by user: duplicate", "OrderOrchestrator");
        assert!(!event.is_retryable);
        assert_eq!(event.header.correlation_id.as_str(), "corr-7");
    }

    #[test]
    fn order_response_uses_status_message() {
        let order = order_worth(1000);
        let response = OrderResponse::from_order(&order);
        assert_eq!(response.status, OrderStatus::Received);
        assert_eq!(response.message, "Order received and queued for processing");

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["orderId"], "ORD-20240101-00000001");
        assert_eq!(json["status"], "Received");
    }

    #[test]
    fn process_request_round_trips() {
        let mut data = BTreeMap::new();
        data.insert("CustomerTier".to_string(), Value::from("Gold"));
        let request = ProcessOrderRequest::new(order_worth(2500), data);

        let json = serde_json::to_string(&request).unwrap();
        let back: ProcessOrderRequest = serde_json::from_str(&json).unwrap();

        assert_eq!(back.order.id(), request.order.id());
        assert_eq!(back.order.total_amount(), Money::from_cents(2500));
        assert_eq!(back.enrichment_data["CustomerTier"], "Gold");
    }
}
