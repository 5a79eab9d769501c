//! Integration tests for the order pipeline's domain stages.
//!
//! These tests drive an order from intake through validation and enrichment
//! against a seeded in-memory catalog, the same way the bridge consumers do.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{CorrelationId, OrderId};
use domain::{
    Aggregate, CatalogSeed, CustomerId, CustomerTier, HighValueErrorEvent, Money, Order,
    OrderEnricher, OrderItem, OrderStatus, OrderValidator, ProcessOrderRequest, ProductId,
    StaticCatalog, DEFAULT_HIGH_VALUE_THRESHOLD,
};
use tokio_util::sync::CancellationToken;

const SEED: &str = r#"{
    "customers": [
        {
            "id": "CUST-001",
            "name": "Acme Retail",
            "email": "orders@acme.test",
            "phone": "+1-555-0100",
            "preferredDeliveryMethod": "Express",
            "creditLimit": 10000.0,
            "currentBalance": 250.0,
            "customerTier": "Gold",
            "preferredProducts": ["P1"]
        }
    ],
    "products": [
        {
            "id": "P1",
            "name": "Widget",
            "category": "Hardware",
            "unitPrice": 25.0,
            "weight": 0.5,
            "weightUnit": "kg",
            "supplier": "Supplier A",
            "leadTimeDays": 2
        },
        {
            "id": "P2",
            "name": "Gadget",
            "category": "Electronics",
            "unitPrice": 50.0,
            "weight": 1.25,
            "weightUnit": "kg",
            "supplier": "Supplier B",
            "leadTimeDays": 3
        }
    ]
}"#;

fn catalog() -> Arc<StaticCatalog> {
    let seed: CatalogSeed = serde_json::from_str(SEED).unwrap();
    Arc::new(StaticCatalog::from_seed(seed))
}

fn received_order(items: &[(&str, u32, i64)]) -> Order {
    let mut order = Order::default();
    order
        .execute(|o| {
            o.create(
                OrderId::generate(),
                CustomerId::new("CUST-001"),
                Some(CorrelationId::from("corr-integration")),
            )
        })
        .unwrap();
    for (product_id, quantity, cents) in items {
        let item = OrderItem::new(*product_id, "Item", *quantity, Money::from_cents(*cents));
        order.execute(|o| o.add_item(item)).unwrap();
    }
    order
        .set_delivery(
            Some(Utc::now() + Duration::days(14)),
            Some("1 Long Street, Springfield".to_string()),
        )
        .unwrap();
    order
}

mod pipeline {
    use super::*;

    #[tokio::test]
    async fn valid_order_flows_through_validation_and_enrichment() {
        let catalog = catalog();
        let validator = OrderValidator::new(catalog.clone(), catalog.clone());
        let enricher = OrderEnricher::new(catalog);
        let cancel = CancellationToken::new();

        let mut order = received_order(&[("P1", 2, 2500), ("P2", 1, 5000)]);
        assert_eq!(order.total_amount(), Money::from_cents(10_000));

        order.execute(|o| o.start_validation()).unwrap();
        let validation = validator.validate(&order, &cancel).await.unwrap();
        assert!(validation.is_valid, "{:?}", validation.errors);
        order.execute(|o| o.complete_validation()).unwrap();

        order.execute(|o| o.start_enrichment()).unwrap();
        let enrichment = enricher.enrich(&order, &cancel).await.unwrap();
        assert!(enrichment.is_successful, "{:?}", enrichment.warnings);
        assert_eq!(enrichment.enrichment_data["CustomerTier"], "Gold");
        assert_eq!(enrichment.enrichment_data["Subtotal"], 100.0);
        assert_eq!(enrichment.enrichment_data["CategoryCount"], 2);
        assert_eq!(
            enrichment.enriched_order.customer_email(),
            Some("orders@acme.test")
        );
        assert_eq!(
            enrichment.enriched_order.get_item(&ProductId::new("P2")).and_then(|i| i.category.as_deref()),
            Some("Electronics")
        );

        // Enrichment works on a copy; the caller's order keeps its own state.
        assert_eq!(order.customer_email(), None);
        order.execute(|o| o.complete_enrichment()).unwrap();
        assert_eq!(order.status(), OrderStatus::Enriched);

        let request = ProcessOrderRequest::new(
            enrichment.enriched_order.clone(),
            enrichment.enrichment_data.clone(),
        );
        let wire = serde_json::to_string(&request).unwrap();
        let back: ProcessOrderRequest = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.order.id(), order.id());
        assert_eq!(back.order.total_amount(), Money::from_cents(10_000));
        assert_eq!(
            back.order.correlation_id().map(|c| c.as_str()),
            Some("corr-integration")
        );
    }

    #[tokio::test]
    async fn missing_product_on_large_order_escalates_as_premium() {
        let catalog = catalog();
        let validator = OrderValidator::new(catalog.clone(), catalog);

        let mut order = received_order(&[("P1", 40, 2500), ("P-404", 1, 500_000)]);
        assert_eq!(order.total_amount(), Money::from_dollars(6000));
        order.execute(|o| o.start_validation()).unwrap();

        let validation = validator
            .validate(&order, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!validation.is_valid);
        assert!(validation.is_high_value_failure(order.total_amount(), DEFAULT_HIGH_VALUE_THRESHOLD));

        let category = validation.primary_error_code().unwrap_or_default().to_string();
        order.execute(|o| o.fail(validation.summary())).unwrap();
        assert_eq!(order.status(), OrderStatus::Failed);

        let escalation = HighValueErrorEvent::new(&order, category, validation.summary(), "Validation");
        assert_eq!(escalation.error_category, "PRODUCT_NOT_FOUND");
        assert_eq!(escalation.customer_tier, CustomerTier::Premium);
        assert_eq!(escalation.header.correlation_id.as_str(), "corr-integration");
    }

    #[tokio::test]
    async fn cancelled_validation_reports_cancellation() {
        let catalog = catalog();
        let validator = OrderValidator::new(catalog.clone(), catalog);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let order = received_order(&[("P1", 1, 2500)]);
        let err = validator.validate(&order, &cancel).await.unwrap_err();
        assert!(matches!(err, domain::DomainError::Cancelled { .. }));
    }
}

mod aggregate_rules {
    use super::*;

    #[test]
    fn totals_track_every_item_mutation() {
        let mut order = received_order(&[("P1", 2, 2500)]);
        order
            .execute(|o| o.add_item(OrderItem::new("P1", "Widget", 1, Money::from_cents(2500))))
            .unwrap();
        assert_eq!(order.total_amount(), Money::from_cents(7500));

        order
            .execute(|o| o.update_item_quantity(ProductId::new("P1"), 0))
            .unwrap();
        assert!(!order.has_items());
        assert_eq!(order.total_amount(), Money::zero());
    }

    #[test]
    fn pipeline_commands_reject_skipped_stages() {
        let order = received_order(&[("P1", 1, 2500)]);
        let err = order.start_enrichment().unwrap_err();
        assert!(err.is_state_conflict());
    }
}
