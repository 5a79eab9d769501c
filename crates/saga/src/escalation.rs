//! High-value failure escalation.

use std::sync::Arc;

use domain::{
    DEFAULT_HIGH_VALUE_THRESHOLD, HighValueErrorEvent, IntegrationEvent, Money, Order,
    ValidationResult,
};

use crate::services::{EventPublisher, publish_or_warn};

/// Stage names carried on escalations.
pub mod stages {
    pub const VALIDATION: &str = "OrderValidation";
    pub const PROCESSING: &str = "OrderProcessing";
}

/// Publishes a [`HighValueErrorEvent`] when a failing order needs human follow-up.
#[derive(Clone)]
pub struct HighValueEscalator {
    publisher: Arc<dyn EventPublisher>,
    threshold: Money,
}

impl HighValueEscalator {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_threshold(publisher, DEFAULT_HIGH_VALUE_THRESHOLD)
    }

    pub fn with_threshold(publisher: Arc<dyn EventPublisher>, threshold: Money) -> Self {
        Self {
            publisher,
            threshold,
        }
    }

    pub fn threshold(&self) -> Money {
        self.threshold
    }

    /// Escalates a failed validation if it is high-value. Returns true if it did.
    pub async fn escalate_validation(&self, order: &Order, result: &ValidationResult) -> bool {
        if !result.is_high_value_failure(order.total_amount(), self.threshold) {
            return false;
        }

        let category = result.primary_error_code().unwrap_or("VALIDATION_FAILED");
        let event = HighValueErrorEvent::new(order, category, result.summary(), stages::VALIDATION)
            .with_technical_details(result.error_codes().join(", "))
            .with_context("ErrorCount", result.errors.len())
            .with_context("ValidatedBy", result.validated_by.clone());

        self.publish(event, stages::VALIDATION).await;
        true
    }

    /// Escalates a processing failure if the order is high-value. Returns true if it did.
    pub async fn escalate_processing(&self, order: &Order, category: &str, reason: &str) -> bool {
        if !order.is_high_value(self.threshold) {
            return false;
        }

        let event = HighValueErrorEvent::new(order, category, reason, stages::PROCESSING)
            .with_context("ItemCount", order.item_count());

        self.publish(event, stages::PROCESSING).await;
        true
    }

    async fn publish(&self, event: HighValueErrorEvent, stage: &'static str) {
        tracing::warn!(
            order_id = %event.order_id,
            category = %event.error_category,
            tier = ?event.customer_tier,
            value = %event.order_value,
            stage,
            "escalating high-value failure"
        );
        metrics::counter!("high_value_errors_total", "stage" => stage).increment(1);
        publish_or_warn(self.publisher.as_ref(), IntegrationEvent::HighValueError(event)).await;
    }
}

#[cfg(test)]
mod tests {
    use common::OrderId;
    use domain::{Aggregate, CustomerId, CustomerTier, OrderItem, topics};

    use super::*;
    use crate::services::InMemoryEventPublisher;

    fn order_worth(dollars: i64) -> Order {
        let mut order = Order::default();
        order
            .execute(|o| o.create(OrderId::new("ORD-1"), CustomerId::new("CUST-001"), None))
            .unwrap();
        order
            .execute(|o| o.add_item(OrderItem::new("P1", "Widget", 1, Money::from_dollars(dollars))))
            .unwrap();
        order
    }

    #[tokio::test]
    async fn processing_failure_escalates_only_above_threshold() {
        let publisher = InMemoryEventPublisher::new();
        let escalator = HighValueEscalator::new(Arc::new(publisher.clone()));

        assert!(!escalator.escalate_processing(&order_worth(1000), "INVENTORY_UNAVAILABLE", "none").await);
        assert!(escalator.escalate_processing(&order_worth(2500), "INVENTORY_UNAVAILABLE", "none").await);

        let events = publisher.events_on(topics::HIGH_VALUE_ERRORS).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            IntegrationEvent::HighValueError(e) => {
                assert_eq!(e.customer_tier, CustomerTier::Gold);
                assert_eq!(e.processing_stage, stages::PROCESSING);
                assert_eq!(e.error_category, "INVENTORY_UNAVAILABLE");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn valid_result_is_never_escalated() {
        let publisher = InMemoryEventPublisher::new();
        let escalator = HighValueEscalator::new(Arc::new(publisher.clone()));
        let result: ValidationResult = serde_json::from_value(serde_json::json!({
            "isValid": true,
            "validatedAt": "2026-01-01T00:00:00Z"
        }))
        .unwrap();

        assert!(!escalator.escalate_validation(&order_worth(9000), &result).await);
        assert!(publisher.events().await.is_empty());
    }
}
