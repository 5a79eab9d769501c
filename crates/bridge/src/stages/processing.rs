use std::sync::Arc;

use async_trait::async_trait;
use domain::{IntegrationEvent, OrderProcessedEvent, ProcessOrderRequest, topics};
use saga::{EventPublisher, publish_or_warn};

use super::names;
use crate::client::InternalApiClient;
use crate::envelope::{Envelope, message_types};
use crate::error::{BridgeError, Result};
use crate::worker::MessageHandler;

/// Source name stamped on messages this stage sends.
pub const SOURCE: &str = "OrderProcessingBridge";

/// Consumes `order-processing` and hands each request to the processing API.
///
/// Errors from the API are returned as classified so the broker's delivery
/// count decides between redelivery and the dead-letter queue.
pub struct ProcessingStage {
    client: Arc<dyn InternalApiClient>,
    events: Arc<dyn EventPublisher>,
}

impl ProcessingStage {
    pub fn new(client: Arc<dyn InternalApiClient>, events: Arc<dyn EventPublisher>) -> Self {
        Self { client, events }
    }

    #[tracing::instrument(
        name = "processing_stage",
        skip_all,
        fields(order_id = tracing::field::Empty, correlation_id = %envelope.correlation_id)
    )]
    async fn run(&self, envelope: &Envelope) -> Result<()> {
        if envelope.message_type != message_types::PROCESS_ORDER_REQUEST {
            return Err(BridgeError::Malformed(format!(
                "unexpected message type {} on {}",
                envelope.message_type,
                topics::ORDER_PROCESSING
            )));
        }
        let request: ProcessOrderRequest = envelope.decode()?;
        if request.order.id().is_empty() {
            return Err(BridgeError::InvalidRequest("Order ID is required".to_string()));
        }
        tracing::Span::current().record("order_id", request.order.id().as_str());

        if !self.client.is_healthy().await {
            tracing::warn!("processing API reports unhealthy, attempting anyway");
        }

        let response = self.client.process_order(&request).await?;
        tracing::info!(status = %response.status, "order processed");

        let event = OrderProcessedEvent::new(&request.order, &response, SOURCE);
        publish_or_warn(self.events.as_ref(), IntegrationEvent::Processed(event)).await;
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for ProcessingStage {
    fn stage(&self) -> &'static str {
        names::PROCESSING
    }

    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        self.run(envelope).await
    }
}
