//! Pipeline stage consumers.
//!
//! Each stage claims the order it was handed by persisting its "running"
//! status, runs its engine, persists the outcome, and only then forwards a
//! message to the next topic. A redelivered message finds the order either
//! still running (the stage runs again) or already done (the stage only
//! forwards again); any other status means the message is stale and is acked
//! without effect.

mod dispatch;
mod enrichment;
mod processing;
mod validation;

pub use dispatch::DispatchStage;
pub use enrichment::EnrichmentStage;
pub use processing::ProcessingStage;
pub use validation::ValidationStage;

use domain::{
    Aggregate, IntegrationEvent, Order, OrderError, OrderEvent, OrderFailedEvent, OrderStatus,
};
use saga::{EventPublisher, publish_or_warn};
use store::{OutboxRecord, Store, StoreTransaction};

use crate::error::Result;

/// Stage names used on logs and metrics.
pub mod names {
    pub const VALIDATION: &str = "validation";
    pub const ENRICHMENT: &str = "enrichment";
    pub const DISPATCH: &str = "dispatch";
    pub const PROCESSING: &str = "processing";
}

type OrderCommand = fn(&Order) -> std::result::Result<Vec<OrderEvent>, OrderError>;

/// The statuses a stage moves an order through, and the command that starts it.
pub(crate) struct StageFlow {
    pub ready: OrderStatus,
    pub running: OrderStatus,
    pub done: OrderStatus,
    pub start: OrderCommand,
}

/// What a stage found when it claimed an order.
pub(crate) enum Claim {
    /// The stage owns the order and must run.
    Run(Order),
    /// The stage already committed its outcome; only the hand-off may be missing.
    Done(Order),
    /// The order is somewhere this stage has no business touching.
    Stale(OrderStatus),
}

async fn write(
    tx: &mut dyn StoreTransaction,
    order: &Order,
    events: &[OrderEvent],
) -> store::Result<()> {
    for event in events {
        tx.append_outbox(&OutboxRecord::for_order_event(order.id(), event)?)
            .await?;
    }
    tx.save_order(order).await
}

/// Loads the stored copy of `incoming` and moves it from `flow.ready` to
/// `flow.running`. An order the store has never seen is adopted as sent.
pub(crate) async fn claim(store: &dyn Store, incoming: &Order, flow: &StageFlow) -> Result<Claim> {
    let mut tx = store.begin().await?;
    let mut order = match tx.load_order_for_update(incoming.id()).await? {
        Some(stored) => stored,
        None => {
            // Only validation may see lines the item guards never checked.
            if incoming.status() != OrderStatus::Received {
                if let Err(e) = incoming.check_lines() {
                    tx.rollback().await?;
                    return Err(e.into());
                }
            }
            incoming.clone()
        }
    };

    let status = order.status();
    if status != flow.ready {
        tx.rollback().await?;
        return Ok(match status {
            s if s == flow.running => Claim::Run(order),
            s if s == flow.done => Claim::Done(order),
            s => Claim::Stale(s),
        });
    }

    let events = order.execute(flow.start)?;
    write(tx.as_mut(), &order, &events).await?;
    tx.commit().await?;
    Ok(Claim::Run(order))
}

/// Applies `command` to `order` and saves it, provided the stored copy is
/// still `running`. Returns false if another delivery got there first.
pub(crate) async fn finish<F>(
    store: &dyn Store,
    order: &mut Order,
    running: OrderStatus,
    command: F,
) -> Result<bool>
where
    F: FnOnce(&Order) -> std::result::Result<Vec<OrderEvent>, OrderError> + Send,
{
    let mut tx = store.begin().await?;
    let stored = tx
        .load_order_for_update(order.id())
        .await?
        .map(|o| o.status());
    if stored.is_some_and(|s| s != running) {
        tx.rollback().await?;
        tracing::info!(status = ?stored, "order moved on, discarding stage result");
        return Ok(false);
    }

    let events = order.execute(command)?;
    write(tx.as_mut(), order, &events).await?;
    tx.commit().await?;
    Ok(true)
}

/// Fails the stored copy of `order` and announces it on `order-failed`.
///
/// Does nothing if the order already left the stage that could fail it.
pub(crate) async fn fail_order(
    store: &dyn Store,
    events: &dyn EventPublisher,
    order: &Order,
    reason: &str,
    details: Vec<String>,
    source: &str,
) -> Result<Option<Order>> {
    let mut tx = store.begin().await?;
    let mut stored = tx
        .load_order_for_update(order.id())
        .await?
        .unwrap_or_else(|| order.clone());
    if !stored.status().can_fail() {
        tx.rollback().await?;
        tracing::info!(status = %stored.status(), "order can no longer be failed, skipping");
        return Ok(None);
    }

    let recorded = stored.execute(|o| o.fail(reason))?;
    write(tx.as_mut(), &stored, &recorded).await?;
    tx.commit().await?;

    tracing::warn!(reason, "order failed");
    let event = OrderFailedEvent::new(&stored, reason, source).with_details(details);
    publish_or_warn(events, IntegrationEvent::Failed(event)).await;
    Ok(Some(stored))
}
