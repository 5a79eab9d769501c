//! Integration tests for intake, reservation and orchestration together.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::OrderId;
use domain::{
    Aggregate, CatalogSeed, CustomerTier, IntegrationEvent, Money, OrderEnricher, OrderStatus,
    OrderValidator, ProcessOrderRequest, ProductId, StaticCatalog, SupplierId, topics,
};
use saga::{
    CreateOrderItemRequest, CreateOrderRequest, HighValueEscalator, InMemoryEventPublisher,
    InMemorySupplierNotifier, OrderIntake, OrderOrchestrator, ReservationEngine,
    ReservationRequest,
};
use store::{InMemoryStore, InventoryRecord, Page, StoreExt, StoreSeed, Supplier};
use tokio_util::sync::CancellationToken;

const CATALOG: &str = r#"{
    "customers": [
        {
            "id": "CUST-001",
            "name": "Acme Retail",
            "email": "orders@acme.test",
            "creditLimit": 100000.0,
            "currentBalance": 0.0,
            "customerTier": "Gold"
        }
    ],
    "products": [
        { "id": "P-100", "name": "Widget", "category": "Hardware", "unitPrice": 25.0, "leadTimeDays": 1 },
        { "id": "P-200", "name": "Gadget", "category": "Electronics", "unitPrice": 50.0, "leadTimeDays": 1 }
    ]
}"#;

struct TestHarness {
    store: InMemoryStore,
    publisher: InMemoryEventPublisher,
    notifier: InMemorySupplierNotifier,
    intake: OrderIntake,
    orchestrator: OrderOrchestrator,
    engine: ReservationEngine,
    validator: OrderValidator,
    enricher: OrderEnricher,
    escalator: HighValueEscalator,
}

impl TestHarness {
    async fn new(stock: &[(&str, i64)]) -> Self {
        let store = InMemoryStore::new();
        store
            .seed(&StoreSeed {
                suppliers: vec![Supplier {
                    id: SupplierId::new("SUP-001"),
                    name: "Main Supplier".to_string(),
                    email: "supply@example.com".to_string(),
                    is_active: true,
                    products: vec![ProductId::new("P-100"), ProductId::new("P-200")],
                }],
                inventory: stock
                    .iter()
                    .map(|(p, q)| InventoryRecord::new(*p, *q, 10))
                    .collect(),
            })
            .await
            .unwrap();

        let seed: CatalogSeed = serde_json::from_str(CATALOG).unwrap();
        let catalog = Arc::new(StaticCatalog::from_seed(seed));
        let publisher = InMemoryEventPublisher::new();
        let notifier = InMemorySupplierNotifier::new();
        let escalator = HighValueEscalator::new(Arc::new(publisher.clone()));

        Self {
            intake: OrderIntake::new(Arc::new(store.clone()), Arc::new(publisher.clone())),
            orchestrator: OrderOrchestrator::new(
                Arc::new(store.clone()),
                Arc::new(notifier.clone()),
                Arc::new(publisher.clone()),
                escalator.clone(),
            ),
            engine: ReservationEngine::new(Arc::new(store.clone())),
            validator: OrderValidator::new(catalog.clone(), catalog.clone()),
            enricher: OrderEnricher::new(catalog),
            escalator,
            store,
            publisher,
            notifier,
        }
    }

    fn request(lines: &[(&str, i64, f64)]) -> CreateOrderRequest {
        CreateOrderRequest {
            customer_id: "CUST-001".to_string(),
            items: lines
                .iter()
                .map(|(product, quantity, price)| CreateOrderItemRequest {
                    product_id: product.to_string(),
                    product_name: None,
                    quantity: *quantity,
                    unit_price: *price,
                })
                .collect(),
            delivery_date: Some(Utc::now() + Duration::days(10)),
            delivery_address: Some("12 Harbour Road, Springfield".to_string()),
            notes: None,
        }
    }

    /// Runs validation and enrichment the way the pipeline stages do and
    /// returns the message the processing stage receives.
    async fn run_upstream_stages(&self, order_id: &OrderId) -> Option<ProcessOrderRequest> {
        let cancel = CancellationToken::new();
        let mut order = self.store.find_order(order_id).await.unwrap().unwrap();

        order.execute(|o| o.start_validation()).unwrap();
        let validation = self.validator.validate(&order, &cancel).await.unwrap();
        if !validation.is_valid {
            self.escalator.escalate_validation(&order, &validation).await;
            order.execute(|o| o.fail(validation.summary())).unwrap();
            self.store.put_order(&order).await.unwrap();
            return None;
        }
        order.execute(|o| o.complete_validation()).unwrap();

        order.execute(|o| o.start_enrichment()).unwrap();
        let enrichment = self.enricher.enrich(&order, &cancel).await.unwrap();
        let mut enriched = enrichment.enriched_order;
        enriched.execute(|o| o.complete_enrichment()).unwrap();
        self.store.put_order(&enriched).await.unwrap();

        Some(ProcessOrderRequest::new(enriched, enrichment.enrichment_data))
    }

    async fn reserved(&self, product: &str) -> i64 {
        self.engine
            .get(&ProductId::new(product))
            .await
            .unwrap()
            .unwrap()
            .quantity_reserved
    }
}

#[tokio::test]
async fn test_happy_path_order_is_confirmed() {
    let h = TestHarness::new(&[("P-100", 100), ("P-200", 20)]).await;

    let created = h
        .intake
        .create(TestHarness::request(&[("P-100", 2, 25.0), ("P-200", 1, 50.0)]))
        .await
        .unwrap();
    let request = h.run_upstream_stages(&created.order_id).await.unwrap();
    let response = h.orchestrator.process(request).await.unwrap();

    assert_eq!(response.status, OrderStatus::Confirmed);
    assert_eq!(h.reserved("P-100").await, 2);
    assert_eq!(h.reserved("P-200").await, 1);

    let order = h.intake.get(&created.order_id).await.unwrap();
    assert_eq!(order.total_amount(), Money::from_dollars(100));
    assert_eq!(order.customer_email(), Some("orders@acme.test"));
    assert!(order.metadata().extra.contains_key("enrichment"));

    let confirmed = h.publisher.events_on(topics::ORDER_CONFIRMED).await;
    match &confirmed[..] {
        [IntegrationEvent::Confirmed(e)] => {
            assert_eq!(Some(&e.header.correlation_id), order.correlation_id());
            assert_eq!(e.supplier_id, SupplierId::new("SUP-001"));
        }
        other => panic!("unexpected events: {other:?}"),
    }
    assert_eq!(h.notifier.sent().await.len(), 1);

    let supplier_orders = h
        .intake
        .list_for_supplier(&SupplierId::new("SUP-001"), Page::default())
        .await
        .unwrap();
    assert_eq!(supplier_orders.len(), 1);
}

#[tokio::test]
async fn test_out_of_stock_fails_and_leaves_inventory_untouched() {
    let h = TestHarness::new(&[("P-100", 100), ("P-200", 5)]).await;

    let created = h
        .intake
        .create(TestHarness::request(&[("P-100", 10, 25.0), ("P-200", 1000, 50.0)]))
        .await
        .unwrap();
    let request = h.run_upstream_stages(&created.order_id).await.unwrap();
    let response = h.orchestrator.process(request).await.unwrap();

    assert_eq!(response.status, OrderStatus::Failed);
    assert_eq!(h.reserved("P-100").await, 0);
    assert_eq!(h.reserved("P-200").await, 0);

    // $50,250 is far above the escalation threshold.
    let escalations = h.publisher.events_on(topics::HIGH_VALUE_ERRORS).await;
    match &escalations[..] {
        [IntegrationEvent::HighValueError(e)] => {
            assert_eq!(e.customer_tier, CustomerTier::Premium);
            assert_eq!(e.error_category, "INVENTORY_UNAVAILABLE");
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_product_escalates_from_validation() {
    let h = TestHarness::new(&[("P-100", 100)]).await;

    let created = h
        .intake
        .create(TestHarness::request(&[("P-100", 40, 25.0), ("P-404", 1, 5000.0)]))
        .await
        .unwrap();

    assert!(h.run_upstream_stages(&created.order_id).await.is_none());

    let status = h.intake.status(&created.order_id).await.unwrap();
    assert_eq!(status.status, OrderStatus::Failed);

    let escalations = h.publisher.events_on(topics::HIGH_VALUE_ERRORS).await;
    match &escalations[..] {
        [IntegrationEvent::HighValueError(e)] => {
            assert_eq!(e.error_category, "PRODUCT_NOT_FOUND");
            assert_eq!(e.customer_tier, CustomerTier::Premium);
            assert_eq!(e.order_value, Money::from_dollars(6000));
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn test_cancel_after_confirmation_is_rejected() {
    let h = TestHarness::new(&[("P-100", 100)]).await;
    let created = h
        .intake
        .create(TestHarness::request(&[("P-100", 1, 25.0)]))
        .await
        .unwrap();
    let request = h.run_upstream_stages(&created.order_id).await.unwrap();
    h.orchestrator.process(request).await.unwrap();

    let err = h
        .orchestrator
        .cancel(&created.order_id, "too late")
        .await
        .unwrap_err();

    assert!(err.is_state_conflict());
    assert_eq!(h.reserved("P-100").await, 1);
}

#[tokio::test]
async fn test_cancel_received_order() {
    let h = TestHarness::new(&[("P-100", 100)]).await;
    let created = h
        .intake
        .create(TestHarness::request(&[("P-100", 1, 25.0)]))
        .await
        .unwrap();

    let response = h
        .orchestrator
        .cancel(&created.order_id, "ordered twice")
        .await
        .unwrap();

    assert_eq!(response.status, OrderStatus::Cancelled);
    assert_eq!(response.message, "Order was cancelled");
    let failed = h.publisher.events_on(topics::ORDER_FAILED).await;
    assert_eq!(failed.len(), 1);

    // A cancelled order can no longer be processed.
    let order = h.intake.get(&created.order_id).await.unwrap();
    let again = h
        .orchestrator
        .process(ProcessOrderRequest::new(order, Default::default()))
        .await
        .unwrap();
    assert_eq!(again.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_concurrent_reservations_never_oversell() {
    let h = TestHarness::new(&[("P-100", 10)]).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .reserve(&[ReservationRequest::new(
                    OrderId::new(format!("ORD-{i}")),
                    ProductId::new("P-100"),
                    3,
                )])
                .await
                .unwrap()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_successful {
            successes += 1;
        }
    }

    assert_eq!(successes, 3);
    assert_eq!(h.reserved("P-100").await, 9);
}
