//! Order orchestrator: reservation, supplier assignment and cancellation.

use std::sync::Arc;

use common::OrderId;
use domain::{
    Aggregate, IntegrationEvent, Order, OrderConfirmedEvent, OrderEvent, OrderFailedEvent,
    OrderResponse, OrderStatus, ProcessOrderRequest, ProductId,
};
use store::{OutboxRecord, Store, StoreTransaction, Supplier};

use crate::error::{Result, SagaError};
use crate::escalation::HighValueEscalator;
use crate::reservation::{ReservationEngine, ReservationRequest};
use crate::services::{EventPublisher, SupplierNotifier, publish_or_warn};

/// Source name stamped on the events the orchestrator publishes.
pub const SOURCE: &str = "OrderOrchestrator";

/// Escalation categories for processing failures.
pub mod categories {
    pub const INVENTORY_UNAVAILABLE: &str = "INVENTORY_UNAVAILABLE";
    pub const NO_SUPPLIER_FOUND: &str = "NO_SUPPLIER_FOUND";
}

const NO_SUPPLIER_REASON: &str = "No suitable supplier found";

enum Outcome {
    Confirmed(Supplier),
    Failed {
        category: &'static str,
        reason: String,
    },
}

/// Drives an enriched order to `Confirmed` or `Failed`, and cancels orders.
///
/// Everything an order goes through in one call happens in one store
/// transaction; integration events are announced only after it commits.
pub struct OrderOrchestrator {
    store: Arc<dyn Store>,
    notifier: Arc<dyn SupplierNotifier>,
    publisher: Arc<dyn EventPublisher>,
    escalator: HighValueEscalator,
}

impl OrderOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn SupplierNotifier>,
        publisher: Arc<dyn EventPublisher>,
        escalator: HighValueEscalator,
    ) -> Self {
        Self {
            store,
            notifier,
            publisher,
            escalator,
        }
    }

    /// Reserves stock, picks a supplier and confirms the order, or fails it.
    ///
    /// Safe to re-invoke for the same order: an existing row is updated rather
    /// than duplicated, and an order that already reached a terminal status is
    /// returned as it stands.
    #[tracing::instrument(
        skip(self, request),
        fields(order_id = %request.order.id(), correlation_id = tracing::field::Empty)
    )]
    pub async fn process(&self, request: ProcessOrderRequest) -> Result<OrderResponse> {
        let started = std::time::Instant::now();
        let ProcessOrderRequest {
            order: incoming,
            enrichment_data,
            ..
        } = request;
        if incoming.id().is_empty() {
            return Err(SagaError::invalid("Order ID is required"));
        }

        let mut tx = self.store.begin().await?;

        // 1. Load or adopt the order, holding its lock until commit
        let mut order = match tx.load_order_for_update(incoming.id()).await? {
            Some(existing) if existing.is_terminal() => {
                tx.rollback().await?;
                tracing::info!(status = %existing.status(), "order already processed");
                return Ok(OrderResponse::from_order(&existing));
            }
            Some(mut existing) => {
                carry_annotations(&mut existing, &incoming);
                existing
            }
            None => {
                // A new order arrives in its wire shape, which skips the item guards.
                if let Err(e) = incoming.check_lines() {
                    tx.rollback().await?;
                    return Err(e.into());
                }
                incoming
            }
        };
        if let Some(correlation_id) = order.correlation_id() {
            tracing::Span::current().record("correlation_id", correlation_id.as_str());
        }
        if !enrichment_data.is_empty() {
            order.metadata_mut().extra.insert(
                "enrichment".to_string(),
                serde_json::Value::Object(enrichment_data.into_iter().collect()),
            );
        }

        // 2. Move to Processing
        let mut events = Vec::new();
        if order.status() == OrderStatus::Enriching {
            events.extend(order.execute(Order::complete_enrichment)?);
        }
        if order.status() != OrderStatus::Processing {
            events.extend(order.execute(Order::start_processing)?);
        }

        // 3. Reserve every line, then pick a supplier
        let outcome = self.reserve_and_assign(tx.as_mut(), &order).await?;

        // 4. Confirm or fail
        match &outcome {
            Outcome::Confirmed(supplier) => {
                events.extend(order.execute(|o| o.confirm(supplier.id.clone()))?);
            }
            Outcome::Failed { reason, .. } => {
                events.extend(order.execute(|o| o.fail(reason.clone()))?);
            }
        }
        for event in &events {
            tx.append_outbox(&OutboxRecord::for_order_event(order.id(), event)?)
                .await?;
        }

        // 5. Notify the supplier before the confirmation is committed
        if let Outcome::Confirmed(supplier) = &outcome {
            self.notify_supplier(tx.as_mut(), supplier, &order).await?;
        }

        tx.save_order(&order).await?;
        tx.commit().await?;

        // 6. Announce the outcome
        match outcome {
            Outcome::Confirmed(supplier) => {
                tracing::info!(supplier_id = %supplier.id, total = %order.total_amount(), "order confirmed");
                let event = OrderConfirmedEvent::new(&order, supplier.id, SOURCE);
                publish_or_warn(self.publisher.as_ref(), IntegrationEvent::Confirmed(event)).await;
            }
            Outcome::Failed { category, reason } => {
                tracing::warn!(category, reason = %reason, "order processing failed");
                let event = OrderFailedEvent::new(&order, reason.clone(), SOURCE);
                publish_or_warn(self.publisher.as_ref(), IntegrationEvent::Failed(event)).await;
                self.escalator
                    .escalate_processing(&order, category, &reason)
                    .await;
            }
        }

        metrics::counter!("orders_processed_total", "status" => order.status().as_str())
            .increment(1);
        metrics::histogram!("order_processing_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        Ok(OrderResponse::from_order(&order))
    }

    async fn reserve_and_assign(
        &self,
        tx: &mut dyn StoreTransaction,
        order: &Order,
    ) -> Result<Outcome> {
        let requests: Vec<ReservationRequest> = order
            .items()
            .iter()
            .map(|item| {
                ReservationRequest::new(
                    order.id().clone(),
                    item.product_id.clone(),
                    i64::from(item.quantity),
                )
            })
            .collect();

        let reservation = ReservationEngine::reserve_in(tx, &requests).await?;
        if !reservation.is_successful {
            return Ok(Outcome::Failed {
                category: categories::INVENTORY_UNAVAILABLE,
                reason: reservation
                    .failure_reason
                    .unwrap_or_else(|| "Inventory reservation failed".to_string()),
            });
        }

        let products: Vec<ProductId> = order
            .items()
            .iter()
            .map(|item| item.product_id.clone())
            .collect();
        match tx.find_supplier_for(&products).await? {
            Some(supplier) => Ok(Outcome::Confirmed(supplier)),
            None => {
                // The stock was held for a supplier that does not exist.
                ReservationEngine::release_in(tx, order.id()).await?;
                Ok(Outcome::Failed {
                    category: categories::NO_SUPPLIER_FOUND,
                    reason: NO_SUPPLIER_REASON.to_string(),
                })
            }
        }
    }

    async fn notify_supplier(
        &self,
        tx: &mut dyn StoreTransaction,
        supplier: &Supplier,
        order: &Order,
    ) -> Result<()> {
        match self.notifier.notify_order(supplier, order).await {
            Ok(()) => {
                tx.append_outbox(&OutboxRecord::new(
                    order.id().as_str(),
                    "SupplierNotified",
                    serde_json::json!({
                        "supplierId": supplier.id,
                        "supplierEmail": supplier.email,
                    }),
                ))
                .await?;
            }
            Err(e) => {
                // The order stays confirmed; the supplier can pick it up from its order list.
                tracing::warn!(supplier_id = %supplier.id, error = %e, "supplier notification failed");
            }
        }
        Ok(())
    }

    /// Cancels an order and gives back any stock held for it.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel(&self, order_id: &OrderId, reason: &str) -> Result<OrderResponse> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .load_order_for_update(order_id)
            .await?
            .ok_or_else(|| SagaError::OrderNotFound(order_id.clone()))?;

        let events: Vec<OrderEvent> = order.execute(|o| o.cancel(reason))?;
        let released = ReservationEngine::release_in(tx.as_mut(), order_id).await?;
        for event in &events {
            tx.append_outbox(&OutboxRecord::for_order_event(order_id, event)?)
                .await?;
        }
        tx.save_order(&order).await?;
        tx.commit().await?;

        tracing::info!(released, reason, "order cancelled");
        let event = OrderFailedEvent::new(&order, format!("Cancelled by user: {reason}"), SOURCE);
        publish_or_warn(self.publisher.as_ref(), IntegrationEvent::Failed(event)).await;
        metrics::counter!("orders_processed_total", "status" => OrderStatus::Cancelled.as_str())
            .increment(1);

        Ok(OrderResponse::from_order(&order))
    }
}

/// Copies what enrichment learned onto the stored order.
fn carry_annotations(stored: &mut Order, incoming: &Order) {
    stored.set_customer_contact(
        incoming.customer_email().map(str::to_string),
        incoming.customer_phone().map(str::to_string),
    );
    for item in incoming.items() {
        if item.category.is_some() {
            stored.annotate_item(
                &item.product_id,
                item.product_name.clone(),
                item.category.clone(),
            );
        }
    }
    for (key, value) in &incoming.metadata().extra {
        stored
            .metadata_mut()
            .extra
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use domain::{CustomerId, Money, OrderItem, SupplierId, topics};
    use store::{InMemoryStore, InventoryRecord, StoreExt, StoreSeed};

    use super::*;
    use crate::services::{InMemoryEventPublisher, InMemorySupplierNotifier};

    struct Harness {
        store: InMemoryStore,
        publisher: InMemoryEventPublisher,
        notifier: InMemorySupplierNotifier,
        orchestrator: OrderOrchestrator,
    }

    async fn harness(suppliers: Vec<Supplier>, stock: &[(&str, i64)]) -> Harness {
        let store = InMemoryStore::new();
        store
            .seed(&StoreSeed {
                suppliers,
                inventory: stock
                    .iter()
                    .map(|(p, q)| InventoryRecord::new(*p, *q, 0))
                    .collect(),
            })
            .await
            .unwrap();
        let publisher = InMemoryEventPublisher::new();
        let notifier = InMemorySupplierNotifier::new();
        let orchestrator = OrderOrchestrator::new(
            Arc::new(store.clone()),
            Arc::new(notifier.clone()),
            Arc::new(publisher.clone()),
            HighValueEscalator::new(Arc::new(publisher.clone())),
        );
        Harness {
            store,
            publisher,
            notifier,
            orchestrator,
        }
    }

    fn supplier(id: &str, products: &[&str]) -> Supplier {
        Supplier {
            id: SupplierId::new(id),
            name: format!("Supplier {id}"),
            email: format!("{}@example.com", id.to_lowercase()),
            is_active: true,
            products: products.iter().map(|p| ProductId::new(*p)).collect(),
        }
    }

    fn order_at(status: OrderStatus, lines: &[(&str, u32, i64)]) -> Order {
        let mut order = Order::default();
        order
            .execute(|o| o.create(OrderId::new("ORD-20260101-0000000A"), CustomerId::new("CUST-001"), None))
            .unwrap();
        for (product, quantity, dollars) in lines {
            order
                .execute(|o| {
                    o.add_item(OrderItem::new(*product, "Item", *quantity, Money::from_dollars(*dollars)))
                })
                .unwrap();
        }
        type Step = fn(&Order) -> std::result::Result<Vec<OrderEvent>, domain::OrderError>;
        let path: [Step; 5] = [
            Order::start_validation,
            Order::complete_validation,
            Order::start_enrichment,
            Order::complete_enrichment,
            Order::start_processing,
        ];
        for step in path {
            if order.status() == status {
                break;
            }
            order.execute(step).unwrap();
        }
        order
    }

    fn request(order: Order) -> ProcessOrderRequest {
        ProcessOrderRequest::new(order, BTreeMap::new())
    }

    async fn reserved(store: &InMemoryStore, product: &str) -> i64 {
        let mut tx = store.begin().await.unwrap();
        tx.inventory(&ProductId::new(product))
            .await
            .unwrap()
            .unwrap()
            .quantity_reserved
    }

    #[tokio::test]
    async fn confirms_order_and_notifies_supplier() {
        let h = harness(vec![supplier("SUP-001", &["P1"])], &[("P1", 100)]).await;
        let order = order_at(OrderStatus::Enriched, &[("P1", 2, 25)]);
        let order_id = order.id().clone();

        let response = h.orchestrator.process(request(order)).await.unwrap();

        assert_eq!(response.status, OrderStatus::Confirmed);
        assert_eq!(response.message, "Order confirmed and sent to supplier");
        assert_eq!(reserved(&h.store, "P1").await, 2);

        let stored = h.store.find_order(&order_id).await.unwrap().unwrap();
        assert_eq!(stored.supplier_id(), Some(&SupplierId::new("SUP-001")));
        assert!(stored.confirmed_at().is_some());
        assert_eq!(h.notifier.sent().await.len(), 1);
        assert_eq!(h.publisher.events_on(topics::ORDER_CONFIRMED).await.len(), 1);

        let kinds: Vec<String> = h.store.outbox().await.into_iter().map(|r| r.event_type).collect();
        assert!(kinds.contains(&"OrderConfirmed".to_string()));
        assert!(kinds.contains(&"SupplierNotified".to_string()));
    }

    #[tokio::test]
    async fn insufficient_stock_fails_order_without_reserving() {
        let h = harness(vec![supplier("SUP-001", &["P1", "P2"])], &[("P1", 100), ("P2", 5)]).await;
        let order = order_at(OrderStatus::Enriched, &[("P1", 10, 25), ("P2", 1000, 1)]);
        let order_id = order.id().clone();

        let response = h.orchestrator.process(request(order)).await.unwrap();

        assert_eq!(response.status, OrderStatus::Failed);
        assert_eq!(reserved(&h.store, "P1").await, 0);
        let stored = h.store.find_order(&order_id).await.unwrap().unwrap();
        assert_eq!(
            stored.metadata().failure_reason.as_deref(),
            Some("Insufficient inventory for product P2. Available: 5, Requested: 1000")
        );
        assert_eq!(h.publisher.events_on(topics::ORDER_FAILED).await.len(), 1);
        // $1250 is over the default threshold.
        assert_eq!(h.publisher.events_on(topics::HIGH_VALUE_ERRORS).await.len(), 1);
    }

    #[tokio::test]
    async fn no_supplier_releases_stock_and_fails() {
        let h = harness(vec![supplier("SUP-001", &["P9"])], &[("P1", 100)]).await;
        let order = order_at(OrderStatus::Enriched, &[("P1", 4, 25)]);

        let response = h.orchestrator.process(request(order)).await.unwrap();

        assert_eq!(response.status, OrderStatus::Failed);
        assert_eq!(reserved(&h.store, "P1").await, 0);
        assert!(h.publisher.events_on(topics::HIGH_VALUE_ERRORS).await.is_empty());
    }

    #[tokio::test]
    async fn inactive_suppliers_are_skipped() {
        let mut inactive = supplier("SUP-001", &["P1"]);
        inactive.is_active = false;
        let h = harness(vec![inactive, supplier("SUP-002", &["P1"])], &[("P1", 100)]).await;
        let order = order_at(OrderStatus::Enriched, &[("P1", 1, 25)]);
        let order_id = order.id().clone();

        h.orchestrator.process(request(order)).await.unwrap();

        let stored = h.store.find_order(&order_id).await.unwrap().unwrap();
        assert_eq!(stored.supplier_id(), Some(&SupplierId::new("SUP-002")));
    }

    #[tokio::test]
    async fn reprocessing_a_confirmed_order_changes_nothing() {
        let h = harness(vec![supplier("SUP-001", &["P1"])], &[("P1", 100)]).await;
        let order = order_at(OrderStatus::Enriched, &[("P1", 3, 25)]);

        h.orchestrator.process(request(order.clone())).await.unwrap();
        let again = h.orchestrator.process(request(order)).await.unwrap();

        assert_eq!(again.status, OrderStatus::Confirmed);
        assert_eq!(reserved(&h.store, "P1").await, 3);
        assert_eq!(h.store.order_count().await, 1);
        assert_eq!(h.notifier.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn notification_failure_keeps_confirmation() {
        let h = harness(vec![supplier("SUP-001", &["P1"])], &[("P1", 100)]).await;
        h.notifier.set_fail_on_notify(true).await;

        let response = h
            .orchestrator
            .process(request(order_at(OrderStatus::Enriched, &[("P1", 1, 25)])))
            .await
            .unwrap();

        assert_eq!(response.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn publish_failure_does_not_undo_commit() {
        let h = harness(vec![supplier("SUP-001", &["P1"])], &[("P1", 100)]).await;
        h.publisher.set_fail_on_publish(true).await;
        let order = order_at(OrderStatus::Enriched, &[("P1", 1, 25)]);
        let order_id = order.id().clone();

        h.orchestrator.process(request(order)).await.unwrap();

        let stored = h.store.find_order(&order_id).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn order_that_skipped_enrichment_is_a_conflict() {
        let h = harness(vec![supplier("SUP-001", &["P1"])], &[("P1", 100)]).await;
        let order = order_at(OrderStatus::Validated, &[("P1", 1, 25)]);

        let err = h.orchestrator.process(request(order)).await.unwrap_err();

        assert!(err.is_state_conflict());
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn adopted_order_with_negative_price_is_rejected() {
        let h = harness(vec![supplier("SUP-001", &["P1"])], &[("P1", 100)]).await;
        let order: Order = serde_json::from_value(serde_json::json!({
            "id": "ORD-20260101-0000000C",
            "customerId": "CUST-001",
            "status": "Enriched",
            "items": [{"productId": "P1", "productName": "Item", "quantity": 3, "unitPrice": -50.0}],
        }))
        .unwrap();

        let err = h.orchestrator.process(request(order)).await.unwrap_err();

        assert!(err.is_invalid_input());
        assert_eq!(h.store.order_count().await, 0);
        assert_eq!(reserved(&h.store, "P1").await, 0);
        assert!(h.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn adopted_order_with_zero_quantity_is_rejected() {
        let h = harness(vec![supplier("SUP-001", &["P1"])], &[("P1", 100)]).await;
        let mut order = order_at(OrderStatus::Enriched, &[("P1", 1, 25)]);
        let mut wire = serde_json::to_value(&order).unwrap();
        wire["items"][0]["quantity"] = serde_json::json!(0);
        order = serde_json::from_value(wire).unwrap();

        let err = h.orchestrator.process(request(order)).await.unwrap_err();

        assert!(err.is_invalid_input());
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn concurrent_deliveries_reserve_once() {
        let h = Arc::new(harness(vec![supplier("SUP-001", &["P1"])], &[("P1", 100)]).await);
        let order = order_at(OrderStatus::Enriched, &[("P1", 3, 25)]);

        let runs: Vec<_> = (0..4)
            .map(|_| {
                let h = h.clone();
                let order = order.clone();
                tokio::spawn(async move { h.orchestrator.process(request(order)).await })
            })
            .collect();
        for run in runs {
            assert_eq!(run.await.unwrap().unwrap().status, OrderStatus::Confirmed);
        }

        assert_eq!(reserved(&h.store, "P1").await, 3);
        assert_eq!(h.notifier.sent().await.len(), 1);
        assert_eq!(h.publisher.events_on(topics::ORDER_CONFIRMED).await.len(), 1);
    }

    #[tokio::test]
    async fn cancel_confirmed_order_is_a_conflict() {
        let h = harness(vec![supplier("SUP-001", &["P1"])], &[("P1", 100)]).await;
        let order = order_at(OrderStatus::Enriched, &[("P1", 1, 25)]);
        let order_id = order.id().clone();
        h.orchestrator.process(request(order)).await.unwrap();

        let err = h.orchestrator.cancel(&order_id, "changed my mind").await.unwrap_err();

        assert!(err.is_state_conflict());
        let stored = h.store.find_order(&order_id).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn cancel_validating_order_releases_stock() {
        let h = harness(vec![], &[("P1", 100)]).await;
        let order = order_at(OrderStatus::Validating, &[("P1", 7, 25)]);
        let order_id = order.id().clone();
        h.store.put_order(&order).await.unwrap();
        ReservationEngine::new(Arc::new(h.store.clone()))
            .reserve(&[ReservationRequest::new(order_id.clone(), ProductId::new("P1"), 7)])
            .await
            .unwrap();

        let response = h.orchestrator.cancel(&order_id, "duplicate").await.unwrap();

        assert_eq!(response.status, OrderStatus::Cancelled);
        assert_eq!(reserved(&h.store, "P1").await, 0);
        let stored = h.store.find_order(&order_id).await.unwrap().unwrap();
        assert_eq!(stored.metadata().cancellation_reason.as_deref(), Some("duplicate"));

        let failed = h.publisher.events_on(topics::ORDER_FAILED).await;
        match &failed[..] {
            [IntegrationEvent::Failed(e)] => {
                assert_eq!(e.failure_reason, "Cancelled by user: duplicate");
                assert!(!e.is_retryable);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_unknown_order_is_not_found() {
        let h = harness(vec![], &[]).await;
        let err = h
            .orchestrator
            .cancel(&OrderId::new("ORD-20260101-FFFFFFFF"), "x")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
