//! Integration-event publisher port and in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{IntegrationEvent, Order};
use thiserror::Error;
use tokio::sync::RwLock;

/// Failure handing a message to the broker.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("could not encode message: {0}")]
    Encode(String),
}

/// Trait for announcing orders and integration events to the pipeline.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an integration event on its topic.
    async fn publish_event(&self, event: &IntegrationEvent) -> Result<(), PublishError>;

    /// Hands a newly received order to the first pipeline stage.
    async fn enqueue_order(&self, order: &Order) -> Result<(), PublishError>;
}

/// Publishes `event`, logging instead of failing.
///
/// Used once the state change is committed: the outbox already holds the
/// durable record, so a lost announcement must not undo the work.
pub async fn publish_or_warn(publisher: &dyn EventPublisher, event: IntegrationEvent) {
    if let Err(e) = publisher.publish_event(&event).await {
        tracing::warn!(
            order_id = %event.order_id(),
            topic = event.topic(),
            error = %e,
            "failed to publish integration event"
        );
        metrics::counter!("integration_events_dropped_total", "topic" => event.topic())
            .increment(1);
    }
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    events: Vec<IntegrationEvent>,
    orders: Vec<Order>,
    fail_on_publish: bool,
}

/// In-memory publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventPublisher {
    state: Arc<RwLock<InMemoryPublisherState>>,
}

impl InMemoryEventPublisher {
    /// Creates a new in-memory publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the publisher to fail every call.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().await.fail_on_publish = fail;
    }

    /// Returns every event published so far.
    pub async fn events(&self) -> Vec<IntegrationEvent> {
        self.state.read().await.events.clone()
    }

    /// Returns the events published on `topic`.
    pub async fn events_on(&self, topic: &str) -> Vec<IntegrationEvent> {
        self.state
            .read()
            .await
            .events
            .iter()
            .filter(|e| e.topic() == topic)
            .cloned()
            .collect()
    }

    /// Returns every order handed to the pipeline.
    pub async fn enqueued_orders(&self) -> Vec<Order> {
        self.state.read().await.orders.clone()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish_event(&self, event: &IntegrationEvent) -> Result<(), PublishError> {
        let mut state = self.state.write().await;
        if state.fail_on_publish {
            return Err(PublishError::Unavailable("publisher offline".to_string()));
        }
        state.events.push(event.clone());
        Ok(())
    }

    async fn enqueue_order(&self, order: &Order) -> Result<(), PublishError> {
        let mut state = self.state.write().await;
        if state.fail_on_publish {
            return Err(PublishError::Unavailable("publisher offline".to_string()));
        }
        state.orders.push(order.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::OrderId;
    use domain::{Aggregate, CustomerId, OrderFailedEvent, topics};

    use super::*;

    fn order() -> Order {
        let mut order = Order::default();
        order
            .execute(|o| o.create(OrderId::new("ORD-1"), CustomerId::new("CUST-1"), None))
            .unwrap();
        order
    }

    #[tokio::test]
    async fn records_events_by_topic() {
        let publisher = InMemoryEventPublisher::new();
        let event = IntegrationEvent::Failed(OrderFailedEvent::new(&order(), "boom", "test"));

        publisher.publish_event(&event).await.unwrap();

        assert_eq!(publisher.events().await.len(), 1);
        assert_eq!(publisher.events_on(topics::ORDER_FAILED).await.len(), 1);
        assert!(publisher.events_on(topics::ORDER_CONFIRMED).await.is_empty());
    }

    #[tokio::test]
    async fn publish_or_warn_swallows_failures() {
        let publisher = InMemoryEventPublisher::new();
        publisher.set_fail_on_publish(true).await;

        let event = IntegrationEvent::Failed(OrderFailedEvent::new(&order(), "boom", "test"));
        publish_or_warn(&publisher, event).await;

        assert!(publisher.events().await.is_empty());
    }
}
