use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    Order, OrderEnricher, OrderEnrichmentResponse, OrderStatus, OrderValidationResponse, topics,
};
use saga::EventPublisher;
use store::Store;
use tokio_util::sync::CancellationToken;

use super::{Claim, StageFlow, claim, fail_order, finish, names};
use crate::broker::{BrokerExt, MessageBroker};
use crate::envelope::{Envelope, message_types};
use crate::error::{BridgeError, Result};
use crate::worker::MessageHandler;

/// Source name stamped on messages this stage sends.
pub const SOURCE: &str = "OrderEnrichment";

const FLOW: StageFlow = StageFlow {
    ready: OrderStatus::Validated,
    running: OrderStatus::Enriching,
    done: OrderStatus::Enriched,
    start: Order::start_enrichment,
};

/// Consumes `order-validated`, enriches, and forwards to `order-enriched`.
pub struct EnrichmentStage {
    store: Arc<dyn Store>,
    enricher: Arc<OrderEnricher>,
    broker: Arc<dyn MessageBroker>,
    events: Arc<dyn EventPublisher>,
}

impl EnrichmentStage {
    pub fn new(
        store: Arc<dyn Store>,
        enricher: Arc<OrderEnricher>,
        broker: Arc<dyn MessageBroker>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            enricher,
            broker,
            events,
        }
    }

    #[tracing::instrument(
        name = "enrichment_stage",
        skip_all,
        fields(order_id = tracing::field::Empty, correlation_id = %envelope.correlation_id)
    )]
    async fn run(&self, envelope: &Envelope) -> Result<()> {
        if envelope.message_type != message_types::ORDER_VALIDATION_RESPONSE {
            return Err(BridgeError::Malformed(format!(
                "unexpected message type {} on {}",
                envelope.message_type,
                topics::ORDER_VALIDATED
            )));
        }
        let OrderValidationResponse {
            order: incoming,
            validation_result,
            ..
        } = envelope.decode()?;
        tracing::Span::current().record("order_id", incoming.id().as_str());

        let (mut order, completed) = match claim(self.store.as_ref(), &incoming, &FLOW).await? {
            Claim::Run(order) => (order, false),
            Claim::Done(order) => (order, true),
            Claim::Stale(status) => {
                tracing::info!(%status, "order is past enrichment, skipping");
                return Ok(());
            }
        };

        if !validation_result.is_valid {
            let reason = format!("Validation failed: {}", validation_result.summary());
            fail_order(
                self.store.as_ref(),
                self.events.as_ref(),
                &order,
                &reason,
                validation_result.error_messages(),
                SOURCE,
            )
            .await?;
            return Ok(());
        }

        let mut result = self.enricher.enrich(&order, &CancellationToken::new()).await?;

        if !result.is_successful {
            if completed {
                tracing::warn!("re-enrichment of an enriched order failed, not forwarding");
                return Ok(());
            }
            let reason = format!("Enrichment failed: {}", result.warnings.join("; "));
            fail_order(
                self.store.as_ref(),
                self.events.as_ref(),
                &order,
                &reason,
                result.warnings.clone(),
                SOURCE,
            )
            .await?;
            return Ok(());
        }

        order = result.enriched_order.clone();
        if !completed
            && !finish(
                self.store.as_ref(),
                &mut order,
                FLOW.running,
                Order::complete_enrichment,
            )
            .await?
        {
            return Ok(());
        }
        result.enriched_order = order.clone();

        let correlation_id = order
            .correlation_id()
            .cloned()
            .unwrap_or_else(|| envelope.correlation_id.clone());
        let response = OrderEnrichmentResponse {
            order,
            validation_result,
            enrichment_result: result,
            processed_at: Utc::now(),
        };
        self.broker
            .publish_payload(
                topics::ORDER_ENRICHED,
                message_types::ORDER_ENRICHMENT_RESPONSE,
                SOURCE,
                correlation_id,
                &response,
            )
            .await?;
        tracing::info!("order enriched and forwarded");
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for EnrichmentStage {
    fn stage(&self) -> &'static str {
        names::ENRICHMENT
    }

    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        self.run(envelope).await
    }
}
