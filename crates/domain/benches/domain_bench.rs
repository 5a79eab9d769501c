use std::sync::Arc;

use common::OrderId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Aggregate, CustomerId, CustomerRecord, Money, Order, OrderEnricher, OrderEvent, OrderItem,
    OrderValidator, ProductId, ProductRecord, StaticCatalog,
};
use tokio_util::sync::CancellationToken;

const ITEM_COUNT: i64 = 50;

fn catalog() -> Arc<StaticCatalog> {
    let mut catalog = StaticCatalog::new().with_customer(CustomerRecord {
        id: CustomerId::new("CUST-BENCH"),
        name: "Bench Customer".to_string(),
        email: "bench@example.test".to_string(),
        phone: String::new(),
        is_active: true,
        preferred_delivery_method: "Standard".to_string(),
        credit_limit: Money::from_dollars(1_000_000),
        current_balance: Money::zero(),
        customer_tier: "Gold".to_string(),
        preferred_products: vec![],
    });
    for v in 1..=ITEM_COUNT {
        catalog = catalog.with_product(ProductRecord {
            id: ProductId::new(format!("SKU-{v:03}")),
            name: format!("Product {v}"),
            description: String::new(),
            category: format!("Category {}", v % 5),
            unit_price: Money::from_cents(100 * v),
            is_active: true,
            weight: 0.5,
            weight_unit: "kg".to_string(),
            supplier: "Bench Supplier".to_string(),
            lead_time_days: 1,
        });
    }
    Arc::new(catalog)
}

fn order_with_items() -> Order {
    let mut order = Order::default();
    order
        .execute(|o| o.create(OrderId::generate(), CustomerId::new("CUST-BENCH"), None))
        .unwrap();
    for v in 1..=ITEM_COUNT {
        let item = OrderItem::new(
            format!("SKU-{v:03}").as_str(),
            format!("Product {v}").as_str(),
            1,
            Money::from_cents(100 * v),
        );
        order.execute(|o| o.add_item(item)).unwrap();
    }
    order
}

fn bench_build_order(c: &mut Criterion) {
    c.bench_function("domain/build_order_50_items", |b| {
        b.iter(order_with_items);
    });
}

fn bench_replay_events(c: &mut Criterion) {
    let mut events = vec![OrderEvent::order_received(
        OrderId::generate(),
        CustomerId::new("CUST-BENCH"),
        None,
    )];
    for v in 1..=ITEM_COUNT {
        let item = OrderItem::new(
            format!("SKU-{v:03}").as_str(),
            "Product",
            1,
            Money::from_cents(100 * v),
        );
        events.push(OrderEvent::item_added(&item));
    }
    let payloads: Vec<serde_json::Value> = events
        .iter()
        .map(|e| serde_json::to_value(e).unwrap())
        .collect();

    c.bench_function("domain/replay_51_events", |b| {
        b.iter(|| {
            let mut order = Order::default();
            for payload in &payloads {
                let event: OrderEvent = serde_json::from_value(payload.clone()).unwrap();
                order.apply(event);
            }
        });
    });
}

fn bench_validate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let catalog = catalog();
    let validator = OrderValidator::new(catalog.clone(), catalog);
    let order = order_with_items();
    let cancel = CancellationToken::new();

    c.bench_function("domain/validate_50_items", |b| {
        b.iter(|| {
            rt.block_on(async {
                let result = validator.validate(&order, &cancel).await.unwrap();
                assert!(result.is_valid);
            });
        });
    });
}

fn bench_enrich(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let enricher = OrderEnricher::new(catalog());
    let order = order_with_items();
    let cancel = CancellationToken::new();

    c.bench_function("domain/enrich_50_items", |b| {
        b.iter(|| {
            rt.block_on(async {
                enricher.enrich(&order, &cancel).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_build_order,
    bench_replay_events,
    bench_validate,
    bench_enrich,
);
criterion_main!(benches);
