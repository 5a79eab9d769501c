//! Message broker port.
//!
//! Topics fan out to consumer groups; the workers of one group compete for
//! its messages. Delivery is at-least-once: a message stays in flight until
//! the consumer acks it, naks it for redelivery, or moves it to the topic's
//! dead-letter queue. A delivery held past its lock is redelivered.

mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::CorrelationId;
use serde::Serialize;

use crate::envelope::Envelope;
use crate::error::BrokerResult;

pub use memory::InMemoryBroker;

/// Consumer group used when a topic has only one logical consumer.
pub const DEFAULT_GROUP: &str = "default";

/// Dead-letter reason when a message ran out of deliveries.
pub const MAX_DELIVERY_EXCEEDED: &str = "MaxDeliveryCountExceeded";

/// Dead-letter reason when a message outlived its time-to-live.
pub const TTL_EXPIRED: &str = "TTLExpiredException";

/// Delivery limits applied by a broker.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Deliveries allowed before a message is dead-lettered.
    pub max_delivery_count: u32,
    /// Age after which an undelivered message is dead-lettered.
    pub message_ttl: Duration,
    /// How long a nak'd message stays invisible before redelivery.
    pub redelivery_delay: Duration,
    /// How long a consumer may hold a delivery before it is redelivered.
    pub lock_duration: Duration,
    /// Keeps a copy of every published envelope for inspection.
    pub record_published: bool,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            max_delivery_count: 10,
            message_ttl: Duration::from_secs(24 * 60 * 60),
            redelivery_delay: Duration::from_secs(1),
            lock_duration: Duration::from_secs(5 * 60),
            record_published: false,
        }
    }
}

/// A message handed to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: Envelope,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_count: u32,
}

/// A message moved to a dead-letter queue.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub envelope: Envelope,
    pub reason: String,
    pub delivery_count: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Trait for brokers the pipeline can run on.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publishes `envelope` to every consumer group of `topic`.
    async fn publish(&self, topic: &str, envelope: Envelope) -> BrokerResult<()>;

    /// Joins `group` on `topic`, creating the group if needed.
    async fn subscribe(&self, topic: &str, group: &str) -> BrokerResult<Arc<dyn Subscription>>;
}

/// One consumer group's view of a topic.
#[async_trait]
pub trait Subscription: Send + Sync {
    fn topic(&self) -> &str;

    fn group(&self) -> &str;

    /// Waits for the next message. Returns `None` once the broker is closed.
    async fn receive(&self) -> Option<Delivery>;

    /// Settles the delivery as handled.
    async fn ack(&self, delivery: &Delivery) -> BrokerResult<()>;

    /// Returns the delivery for redelivery, dead-lettering it if its
    /// delivery count is exhausted.
    async fn nak(&self, delivery: &Delivery) -> BrokerResult<()>;

    /// Moves the delivery to the topic's dead-letter queue.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> BrokerResult<()>;
}

/// Extension trait providing typed publishing.
#[async_trait]
pub trait BrokerExt: MessageBroker {
    /// Serializes `payload` into an envelope and publishes it on `topic`.
    async fn publish_payload<T: Serialize + Sync>(
        &self,
        topic: &str,
        message_type: &str,
        source: &str,
        correlation_id: CorrelationId,
        payload: &T,
    ) -> BrokerResult<()> {
        let envelope = Envelope::encode(message_type, source, correlation_id, payload)?;
        self.publish(topic, envelope).await
    }
}

// Blanket implementation for all MessageBroker implementations
impl<T: MessageBroker + ?Sized> BrokerExt for T {}
