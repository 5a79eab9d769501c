use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domain::{Order, OrderStatus, OrderValidationResponse, OrderValidator, topics};
use saga::{EventPublisher, HighValueEscalator};
use store::Store;
use tokio_util::sync::CancellationToken;

use super::{Claim, StageFlow, claim, fail_order, finish, names};
use crate::broker::{BrokerExt, MessageBroker};
use crate::envelope::{Envelope, message_types};
use crate::error::{BridgeError, Result};
use crate::worker::MessageHandler;

/// Source name stamped on messages this stage sends.
pub const SOURCE: &str = "OrderValidation";

const FLOW: StageFlow = StageFlow {
    ready: OrderStatus::Received,
    running: OrderStatus::Validating,
    done: OrderStatus::Validated,
    start: Order::start_validation,
};

/// Consumes `order-received`, validates, and forwards to `order-validated`.
///
/// The topic also carries `OrderReceivedEvent` announcements; anything that
/// is not an order is acked untouched.
pub struct ValidationStage {
    store: Arc<dyn Store>,
    validator: Arc<OrderValidator>,
    escalator: HighValueEscalator,
    broker: Arc<dyn MessageBroker>,
    events: Arc<dyn EventPublisher>,
}

impl ValidationStage {
    pub fn new(
        store: Arc<dyn Store>,
        validator: Arc<OrderValidator>,
        escalator: HighValueEscalator,
        broker: Arc<dyn MessageBroker>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            validator,
            escalator,
            broker,
            events,
        }
    }

    #[tracing::instrument(
        name = "validation_stage",
        skip_all,
        fields(order_id = tracing::field::Empty, correlation_id = %envelope.correlation_id)
    )]
    async fn run(&self, envelope: &Envelope) -> Result<()> {
        if envelope.message_type != message_types::ORDER {
            tracing::debug!(message_type = %envelope.message_type, "not an order, skipping");
            return Ok(());
        }
        let incoming: Order = envelope.decode()?;
        if incoming.id().is_empty() {
            return Err(BridgeError::Malformed("order has no id".to_string()));
        }
        tracing::Span::current().record("order_id", incoming.id().as_str());

        let (mut order, completed) = match claim(self.store.as_ref(), &incoming, &FLOW).await? {
            Claim::Run(order) => (order, false),
            Claim::Done(order) => (order, true),
            Claim::Stale(status) => {
                tracing::info!(%status, "order is past validation, skipping");
                return Ok(());
            }
        };

        // Queue deliveries have no caller to cancel them.
        let result = self
            .validator
            .validate(&order, &CancellationToken::new())
            .await?;

        if !result.is_valid {
            if completed {
                tracing::warn!("validated order no longer passes validation, not forwarding");
                return Ok(());
            }
            let reason = format!("Validation failed: {}", result.summary());
            let failed = fail_order(
                self.store.as_ref(),
                self.events.as_ref(),
                &order,
                &reason,
                result.error_messages(),
                SOURCE,
            )
            .await?;
            if let Some(failed) = failed {
                self.escalator.escalate_validation(&failed, &result).await;
            }
            return Ok(());
        }

        if !completed
            && !finish(
                self.store.as_ref(),
                &mut order,
                FLOW.running,
                Order::complete_validation,
            )
            .await?
        {
            return Ok(());
        }

        let correlation_id = order
            .correlation_id()
            .cloned()
            .unwrap_or_else(|| envelope.correlation_id.clone());
        let response = OrderValidationResponse {
            order,
            validation_result: result,
            processed_at: Utc::now(),
        };
        self.broker
            .publish_payload(
                topics::ORDER_VALIDATED,
                message_types::ORDER_VALIDATION_RESPONSE,
                SOURCE,
                correlation_id,
                &response,
            )
            .await?;
        tracing::info!("order validated and forwarded");
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for ValidationStage {
    fn stage(&self) -> &'static str {
        names::VALIDATION
    }

    async fn handle(&self, envelope: &Envelope) -> Result<()> {
        self.run(envelope).await
    }
}
