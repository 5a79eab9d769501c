//! Integration-event publisher backed by a message broker.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{IntegrationEvent, Order, topics};
use saga::{EventPublisher, PublishError};

use crate::broker::MessageBroker;
use crate::envelope::Envelope;
use crate::error::BrokerError;

/// Publishes saga events and new orders onto broker topics.
#[derive(Clone)]
pub struct BrokerEventPublisher {
    broker: Arc<dyn MessageBroker>,
    source: String,
}

impl BrokerEventPublisher {
    /// `source` is stamped on the envelopes of enqueued orders.
    pub fn new(broker: Arc<dyn MessageBroker>, source: impl Into<String>) -> Self {
        Self {
            broker,
            source: source.into(),
        }
    }
}

fn publish_error(err: BrokerError) -> PublishError {
    match err {
        BrokerError::Serialization(e) => PublishError::Encode(e.to_string()),
        other => PublishError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl EventPublisher for BrokerEventPublisher {
    async fn publish_event(&self, event: &IntegrationEvent) -> Result<(), PublishError> {
        let envelope = Envelope::for_event(event).map_err(publish_error)?;
        self.broker
            .publish(event.topic(), envelope)
            .await
            .map_err(publish_error)
    }

    async fn enqueue_order(&self, order: &Order) -> Result<(), PublishError> {
        let envelope = Envelope::for_order(order, &self.source).map_err(publish_error)?;
        self.broker
            .publish(topics::ORDER_RECEIVED, envelope)
            .await
            .map_err(publish_error)
    }
}

#[cfg(test)]
mod tests {
    use common::{CorrelationId, OrderId};
    use domain::{Aggregate, CustomerId, OrderReceivedEvent};

    use super::*;
    use crate::broker::{BrokerSettings, InMemoryBroker};
    use crate::envelope::message_types;

    fn order() -> Order {
        let mut order = Order::default();
        order
            .execute(|o| {
                o.create(
                    OrderId::new("ORD-1"),
                    CustomerId::new("CUST-001"),
                    Some(CorrelationId::from("corr-9")),
                )
            })
            .unwrap();
        order
    }

    #[tokio::test]
    async fn order_and_received_event_share_the_topic() {
        let broker = InMemoryBroker::new(BrokerSettings {
            record_published: true,
            ..BrokerSettings::default()
        });
        let publisher = BrokerEventPublisher::new(Arc::new(broker.clone()), "OrderIntake");
        let order = order();

        publisher.enqueue_order(&order).await.unwrap();
        publisher
            .publish_event(&IntegrationEvent::Received(OrderReceivedEvent::new(&order, "OrderIntake")))
            .await
            .unwrap();

        let published = broker.published(topics::ORDER_RECEIVED).await;
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].message_type, message_types::ORDER);
        assert_eq!(published[1].message_type, "OrderReceivedEvent");
        assert!(published.iter().all(|e| e.correlation_id.as_str() == "corr-9"));
    }

    #[tokio::test]
    async fn closed_broker_is_unavailable() {
        let broker = InMemoryBroker::default();
        broker.close().await;
        let publisher = BrokerEventPublisher::new(Arc::new(broker), "OrderIntake");

        let err = publisher.enqueue_order(&order()).await.unwrap_err();

        assert!(matches!(err, PublishError::Unavailable(_)));
    }
}
