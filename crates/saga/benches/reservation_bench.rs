use std::sync::Arc;

use common::OrderId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::ProductId;
use saga::{ReservationEngine, ReservationRequest};
use store::{InMemoryStore, InventoryRecord, StoreExt, StoreSeed};

fn seeded_engine(rt: &tokio::runtime::Runtime, products: usize) -> ReservationEngine {
    let store = InMemoryStore::new();
    let seed = StoreSeed {
        suppliers: vec![],
        inventory: (0..products)
            .map(|i| InventoryRecord::new(format!("P-{i:03}").as_str(), 1_000_000, 10))
            .collect(),
    };
    rt.block_on(store.seed(&seed)).unwrap();
    ReservationEngine::new(Arc::new(store))
}

fn requests(order: &str, products: usize) -> Vec<ReservationRequest> {
    (0..products)
        .map(|i| {
            ReservationRequest::new(OrderId::new(order), ProductId::new(format!("P-{i:03}")), 1)
        })
        .collect()
}

fn bench_reserve_10_lines(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = seeded_engine(&rt, 10);
    let batch = requests("ORD-BENCH", 10);

    c.bench_function("reservation/reserve_10_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine.reserve(&batch).await.unwrap();
            });
        });
    });
}

fn bench_rejected_batch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = seeded_engine(&rt, 10);
    let mut batch = requests("ORD-BENCH", 10);
    batch.push(ReservationRequest::new(
        OrderId::new("ORD-BENCH"),
        ProductId::new("P-MISSING"),
        1,
    ));

    c.bench_function("reservation/rejected_batch_11_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                let result = engine.reserve(&batch).await.unwrap();
                assert!(!result.is_successful);
            });
        });
    });
}

fn bench_reserve_and_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = seeded_engine(&rt, 10);
    let batch = requests("ORD-BENCH", 10);
    let order_id = OrderId::new("ORD-BENCH");

    c.bench_function("reservation/reserve_then_release_10_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine.reserve(&batch).await.unwrap();
                engine.release(&order_id).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_reserve_10_lines,
    bench_rejected_batch,
    bench_reserve_and_release
);
criterion_main!(benches);
