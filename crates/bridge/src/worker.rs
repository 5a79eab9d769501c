//! Consumer loop and worker pool.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::broker::{Delivery, MessageBroker, Subscription};
use crate::envelope::Envelope;
use crate::error::{BrokerResult, Result};

/// Trait for the stage logic run on each message of a topic.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Stage name used on logs and metrics.
    fn stage(&self) -> &'static str;

    /// Handles one message. An `Err` is settled by its retry classification.
    async fn handle(&self, envelope: &Envelope) -> Result<()>;
}

/// Runs `handler` on every message of `subscription` until cancelled or the
/// broker closes.
pub async fn consume(
    subscription: Arc<dyn Subscription>,
    handler: Arc<dyn MessageHandler>,
    cancel: CancellationToken,
) {
    loop {
        let delivery = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            delivery = subscription.receive() => delivery,
        };
        let Some(delivery) = delivery else {
            break;
        };
        settle(subscription.as_ref(), handler.as_ref(), delivery).await;
    }
    tracing::debug!(
        topic = subscription.topic(),
        stage = handler.stage(),
        "consumer stopped"
    );
}

/// Handles one delivery and acks, naks or dead-letters it.
async fn settle(subscription: &dyn Subscription, handler: &dyn MessageHandler, delivery: Delivery) {
    let stage = handler.stage();
    let span = tracing::info_span!(
        "message",
        stage,
        topic = subscription.topic(),
        message_id = %delivery.envelope.message_id,
        correlation_id = %delivery.envelope.correlation_id,
        delivery_count = delivery.delivery_count,
    );

    async {
        let (outcome, settled) = match handler.handle(&delivery.envelope).await {
            Ok(()) => ("ok", subscription.ack(&delivery).await),
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, kind = e.kind(), "stage failed, message will be redelivered");
                ("retry", subscription.nak(&delivery).await)
            }
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "stage failed permanently");
                ("dead_letter", subscription.dead_letter(&delivery, &e.to_string()).await)
            }
        };
        if let Err(e) = settled {
            tracing::warn!(error = %e, outcome, "failed to settle message");
        }
        metrics::counter!("bridge_messages_total", "stage" => stage, "outcome" => outcome)
            .increment(1);
    }
    .instrument(span)
    .await
}

/// A set of competing consumers on one topic.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Subscribes to `topic` as `group` and starts `concurrency` consumers.
    pub async fn spawn(
        broker: &dyn MessageBroker,
        topic: &str,
        group: &str,
        handler: Arc<dyn MessageHandler>,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> BrokerResult<Self> {
        let subscription = broker.subscribe(topic, group).await?;
        let handles = (0..concurrency.max(1))
            .map(|_| {
                tokio::spawn(consume(
                    subscription.clone(),
                    handler.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        tracing::info!(topic, group, stage = handler.stage(), concurrency, "workers started");
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every consumer to stop.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
    }
}
