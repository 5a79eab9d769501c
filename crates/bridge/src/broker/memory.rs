use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::MessageId;
use domain::topics;
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;

use super::{
    BrokerSettings, DEFAULT_GROUP, DeadLetter, Delivery, MAX_DELIVERY_EXCEEDED, MessageBroker,
    Subscription, TTL_EXPIRED,
};
use crate::envelope::Envelope;
use crate::error::{BrokerError, BrokerResult};

#[derive(Debug)]
struct Queued {
    envelope: Envelope,
    delivery_count: u32,
    visible_at: Instant,
}

#[derive(Debug)]
struct Locked {
    delivery: Delivery,
    locked_until: Instant,
}

#[derive(Debug, Default)]
struct GroupQueue {
    ready: VecDeque<Queued>,
    in_flight: HashMap<MessageId, Locked>,
    subscribed: bool,
}

impl GroupQueue {
    /// Removes every in-flight delivery whose lock ran out by `now`.
    fn take_lapsed(&mut self, now: Instant) -> Vec<Delivery> {
        let lapsed: Vec<MessageId> = self
            .in_flight
            .iter()
            .filter(|(_, locked)| locked.locked_until <= now)
            .map(|(id, _)| *id)
            .collect();
        lapsed
            .into_iter()
            .filter_map(|id| self.in_flight.remove(&id))
            .map(|locked| locked.delivery)
            .collect()
    }

    /// Earliest moment something queued becomes visible or a lock runs out.
    fn next_wakeup(&self) -> Option<Instant> {
        let visible = self.ready.iter().map(|m| m.visible_at);
        let unlocked = self.in_flight.values().map(|l| l.locked_until);
        visible.chain(unlocked).min()
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    topics: HashMap<String, BTreeMap<String, GroupQueue>>,
    dead_letters: HashMap<String, Vec<DeadLetter>>,
    published: HashMap<String, Vec<Envelope>>,
    closed: bool,
}

impl BrokerState {
    fn queue(&mut self, topic: &str, group: &str) -> Option<&mut GroupQueue> {
        self.topics.get_mut(topic)?.get_mut(group)
    }

    /// Removes `delivery` from the in-flight set. A delivery whose lock ran
    /// out and was handed out again no longer matches.
    fn take_in_flight(
        &mut self,
        topic: &str,
        group: &str,
        delivery: &Delivery,
    ) -> BrokerResult<Delivery> {
        let id = delivery.envelope.message_id;
        let unknown = || BrokerError::UnknownDelivery {
            message_id: id,
            topic: topic.to_string(),
        };
        let in_flight = &mut self.queue(topic, group).ok_or_else(unknown)?.in_flight;
        match in_flight.get(&id) {
            Some(locked) if locked.delivery.delivery_count == delivery.delivery_count => {}
            _ => return Err(unknown()),
        }
        in_flight.remove(&id).map(|l| l.delivery).ok_or_else(unknown)
    }

    fn dead_letter(&mut self, topic: &str, envelope: Envelope, delivery_count: u32, reason: &str) {
        let dlq = topics::dead_letter(topic);
        tracing::warn!(
            topic,
            message_id = %envelope.message_id,
            message_type = %envelope.message_type,
            correlation_id = %envelope.correlation_id,
            delivery_count,
            reason,
            "message dead-lettered"
        );
        metrics::counter!("messages_dead_lettered_total", "topic" => topic.to_string())
            .increment(1);
        self.dead_letters.entry(dlq).or_default().push(DeadLetter {
            envelope,
            reason: reason.to_string(),
            delivery_count,
            dead_lettered_at: Utc::now(),
        });
    }
}

enum Poll {
    Ready(Delivery),
    WaitUntil(Option<Instant>),
    Closed,
}

/// In-memory broker for tests and single-process runs.
///
/// Each consumer group keeps its own queue. A message published before any
/// group exists lands in [`DEFAULT_GROUP`], so nothing sent ahead of the
/// workers starting is lost.
#[derive(Clone)]
pub struct InMemoryBroker {
    settings: BrokerSettings,
    state: Arc<RwLock<BrokerState>>,
    notify: Arc<Notify>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(BrokerSettings::default())
    }
}

impl InMemoryBroker {
    pub fn new(settings: BrokerSettings) -> Self {
        tracing::info!(
            max_delivery_count = settings.max_delivery_count,
            ttl_secs = settings.message_ttl.as_secs(),
            "in-memory broker initialized"
        );
        Self {
            settings,
            state: Arc::new(RwLock::new(BrokerState::default())),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    /// Messages dead-lettered from `topic`, oldest first.
    pub async fn dead_letters(&self, topic: &str) -> Vec<DeadLetter> {
        self.state
            .read()
            .await
            .dead_letters
            .get(&topics::dead_letter(topic))
            .cloned()
            .unwrap_or_default()
    }

    /// Envelopes published on `topic`, oldest first.
    ///
    /// Always empty unless [`BrokerSettings::record_published`] is set.
    pub async fn published(&self, topic: &str) -> Vec<Envelope> {
        self.state
            .read()
            .await
            .published
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns true when no subscribed group has a message queued or in flight.
    pub async fn is_idle(&self) -> bool {
        self.state.read().await.topics.values().all(|groups| {
            groups
                .values()
                .filter(|q| q.subscribed)
                .all(|q| q.ready.is_empty() && q.in_flight.is_empty())
        })
    }

    /// Polls until [`InMemoryBroker::is_idle`] holds or `timeout` passes.
    /// Returns false on timeout.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle().await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stops the broker. Pending receives return `None` and publishes fail.
    pub async fn close(&self) {
        self.state.write().await.closed = true;
        self.notify.notify_waiters();
        tracing::info!("in-memory broker closed");
    }

    async fn poll(&self, topic: &str, group: &str) -> Poll {
        let mut state = self.state.write().await;
        if state.closed {
            return Poll::Closed;
        }
        let now = Instant::now();
        let wall_now = Utc::now();
        let ttl = self.settings.message_ttl;

        let max_deliveries = self.settings.max_delivery_count;
        let locked_until = now + self.settings.lock_duration;

        let mut expired = Vec::new();
        let mut exhausted = Vec::new();
        let polled = match state.queue(topic, group) {
            None => Poll::WaitUntil(None),
            Some(queue) => {
                // A consumer that held a delivery past its lock is presumed gone.
                for delivery in queue.take_lapsed(now) {
                    tracing::warn!(
                        topic,
                        group,
                        message_id = %delivery.envelope.message_id,
                        delivery_count = delivery.delivery_count,
                        "delivery lock expired"
                    );
                    if delivery.delivery_count >= max_deliveries {
                        exhausted.push(delivery);
                    } else {
                        queue.ready.push_back(Queued {
                            envelope: delivery.envelope,
                            delivery_count: delivery.delivery_count,
                            visible_at: now,
                        });
                    }
                }
                loop {
                    let Some(position) = queue.ready.iter().position(|m| m.visible_at <= now)
                    else {
                        break Poll::WaitUntil(queue.next_wakeup());
                    };
                    let Some(message) = queue.ready.remove(position) else {
                        break Poll::WaitUntil(None);
                    };
                    if message.envelope.is_expired(ttl, wall_now) {
                        expired.push(message);
                        continue;
                    }
                    let delivery = Delivery {
                        envelope: message.envelope,
                        delivery_count: message.delivery_count + 1,
                    };
                    queue.in_flight.insert(
                        delivery.envelope.message_id,
                        Locked {
                            delivery: delivery.clone(),
                            locked_until,
                        },
                    );
                    break Poll::Ready(delivery);
                }
            }
        };

        for message in expired {
            state.dead_letter(topic, message.envelope, message.delivery_count, TTL_EXPIRED);
        }
        for delivery in exhausted {
            state.dead_letter(
                topic,
                delivery.envelope,
                delivery.delivery_count,
                MAX_DELIVERY_EXCEEDED,
            );
        }
        polled
    }

    async fn requeue(&self, topic: &str, group: &str, delivery: Delivery) {
        let visible_at = Instant::now() + self.settings.redelivery_delay;
        let mut state = self.state.write().await;
        if delivery.delivery_count >= self.settings.max_delivery_count {
            state.dead_letter(
                topic,
                delivery.envelope,
                delivery.delivery_count,
                MAX_DELIVERY_EXCEEDED,
            );
            return;
        }
        if let Some(queue) = state.queue(topic, group) {
            queue.ready.push_back(Queued {
                envelope: delivery.envelope,
                delivery_count: delivery.delivery_count,
                visible_at,
            });
        }
        drop(state);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, topic: &str, envelope: Envelope) -> BrokerResult<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }
        tracing::debug!(
            topic,
            message_id = %envelope.message_id,
            message_type = %envelope.message_type,
            "message published"
        );
        if self.settings.record_published {
            state
                .published
                .entry(topic.to_string())
                .or_default()
                .push(envelope.clone());
        }

        let groups = state.topics.entry(topic.to_string()).or_default();
        if groups.is_empty() {
            groups.insert(DEFAULT_GROUP.to_string(), GroupQueue::default());
        }
        let now = Instant::now();
        for queue in groups.values_mut() {
            queue.ready.push_back(Queued {
                envelope: envelope.clone(),
                delivery_count: 0,
                visible_at: now,
            });
        }
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> BrokerResult<Arc<dyn Subscription>> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(BrokerError::Closed);
        }
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .entry(group.to_string())
            .or_default()
            .subscribed = true;
        tracing::info!(topic, group, "subscribed");

        Ok(Arc::new(InMemorySubscription {
            broker: self.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
        }))
    }
}

struct InMemorySubscription {
    broker: InMemoryBroker,
    topic: String,
    group: String,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn group(&self) -> &str {
        &self.group
    }

    async fn receive(&self) -> Option<Delivery> {
        loop {
            // Register for wakeups before looking, so a publish in between is not missed.
            let notified = self.broker.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.broker.poll(&self.topic, &self.group).await {
                Poll::Ready(delivery) => return Some(delivery),
                Poll::Closed => return None,
                Poll::WaitUntil(Some(at)) => {
                    let _ = tokio::time::timeout_at(at, notified).await;
                }
                Poll::WaitUntil(None) => notified.await,
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> BrokerResult<()> {
        let mut state = self.broker.state.write().await;
        state.take_in_flight(&self.topic, &self.group, delivery)?;
        Ok(())
    }

    async fn nak(&self, delivery: &Delivery) -> BrokerResult<()> {
        let in_flight = self
            .broker
            .state
            .write()
            .await
            .take_in_flight(&self.topic, &self.group, delivery)?;
        self.broker.requeue(&self.topic, &self.group, in_flight).await;
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> BrokerResult<()> {
        let mut state = self.broker.state.write().await;
        let in_flight =
            state.take_in_flight(&self.topic, &self.group, delivery)?;
        state.dead_letter(&self.topic, in_flight.envelope, in_flight.delivery_count, reason);
        Ok(())
    }
}
