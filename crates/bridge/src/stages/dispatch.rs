use std::sync::Arc;

use async_trait::async_trait;
use domain::{OrderEnrichmentResponse, ProcessOrderRequest, topics};
use saga::EventPublisher;
use store::Store;

use super::{fail_order, names};
use crate::broker::{BrokerExt, MessageBroker};
use crate::envelope::{Envelope, message_types};
use crate::error::{BridgeError, Result};
use crate::worker::MessageHandler;

/// Source name stamped on messages this stage sends.
pub const SOURCE: &str = "OrderDispatch";

/// Consumes `order-enriched` and queues a processing request on
/// `order-processing`.
pub struct DispatchStage {
    store: Arc<dyn Store>,
    broker: Arc<dyn MessageBroker>,
    events: Arc<dyn EventPublisher>,
}

impl DispatchStage {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn MessageBroker>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            broker,
            events,
        }
    }

    #[tracing::instrument(
        name = "dispatch_stage",
        skip_all,
        fields(order_id = tracing::field::Empty, correlation_id = %envelope.correlation_id)
    )]
    async fn run(&self, envelope: &Envelope) -> Result<()> {
        if envelope.message_type != message_types::ORDER_ENRICHMENT_RESPONSE {
            return Err(BridgeError::Malformed(format!(
                "unexpected message type {} on {}",
                envelope.message_type,
                topics::ORDER_ENRICHED
            )));
        }
        let response: OrderEnrichmentResponse = envelope.decode()?;
        tracing::Span::current().record("order_id", response.order.id().as_str());

        let enrichment = response.enrichment_result;
        if !enrichment.is_successful {
            let reason = format!("Enrichment failed: {}", enrichment.warnings.join("; "));
            fail_order(
                self.store.as_ref(),
                self.events.as_ref(),
                &response.order,
                &reason,
                enrichment.warnings,
                SOURCE,
            )
            .await?;
            return Ok(());
        }

        let correlation_id = enrichment
            .enriched_order
            .correlation_id()
            .cloned()
            .unwrap_or_else(|| envelope.correlation_id.clone());
        let request = ProcessOrderRequest::new(enrichment.enriched_order, enrichment.enrichment_data);
        self.broker
            .publish_payload(
                topics::ORDER_PROCESSING,
                message_types::PROCESS_ORDER_REQUEST,
                SOURCE,
                correlation_id,
                &request,
            )
            .await?;
        tracing::info!("order queued for processing");
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for DispatchStage {
    fn stage(&self) -> &'static str {
        names::DISPATCH
    }

    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        self.run(envelope).await
    }
}
