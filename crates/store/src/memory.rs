use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::OrderId;
use domain::{CustomerId, Order, ProductId, SupplierId};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::{
    InventoryRecord, OutboxRecord, Page, ReservationLine, Result, StoreError, Supplier,
    store::{Store, StoreTransaction},
};

#[derive(Debug, Clone, Default)]
struct StoreState {
    orders: HashMap<OrderId, Order>,
    inventory: BTreeMap<ProductId, InventoryRecord>,
    suppliers: BTreeMap<SupplierId, Supplier>,
    reservations: Vec<ReservationLine>,
    outbox: Vec<OutboxRecord>,
}

/// In-memory store implementation for tests and single-process runs.
///
/// A transaction holds the write lock for its whole life and works on a copy
/// of the state, so transactions are serialized and a rollback simply drops
/// the copy. Read transactions share the read lock and see the state in place.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns every outbox record, oldest first.
    pub async fn outbox(&self) -> Vec<OutboxRecord> {
        self.state.read().await.outbox.clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = self.state.clone().write_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction::Write { guard, working }))
    }

    async fn begin_read(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = self.state.clone().read_owned().await;
        Ok(Box::new(InMemoryTransaction::Read(guard)))
    }
}

enum InMemoryTransaction {
    Write {
        guard: OwnedRwLockWriteGuard<StoreState>,
        working: StoreState,
    },
    Read(OwnedRwLockReadGuard<StoreState>),
}

impl InMemoryTransaction {
    fn state(&self) -> &StoreState {
        match self {
            Self::Write { working, .. } => working,
            Self::Read(guard) => &**guard,
        }
    }

    fn state_mut(&mut self) -> Result<&mut StoreState> {
        match self {
            Self::Write { working, .. } => Ok(working),
            Self::Read(_) => Err(StoreError::ReadOnly),
        }
    }

    fn page_of<'a>(orders: impl Iterator<Item = &'a Order>, page: Page) -> Vec<Order> {
        let mut matching: Vec<&Order> = orders.collect();
        matching.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(a.id()))
        });
        matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn load_order(&mut self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.state().orders.get(id).cloned())
    }

    async fn load_order_for_update(&mut self, id: &OrderId) -> Result<Option<Order>> {
        // The transaction already holds the store-wide write lock.
        self.state_mut()?;
        self.load_order(id).await
    }

    async fn save_order(&mut self, order: &Order) -> Result<()> {
        self.state_mut()?
            .orders
            .insert(order.id().clone(), order.clone());
        Ok(())
    }

    async fn orders_for_customer(
        &mut self,
        customer: &CustomerId,
        page: Page,
    ) -> Result<Vec<Order>> {
        let orders = self
            .state()
            .orders
            .values()
            .filter(|o| o.customer_id() == customer);
        Ok(Self::page_of(orders, page))
    }

    async fn orders_for_supplier(
        &mut self,
        supplier: &SupplierId,
        page: Page,
    ) -> Result<Vec<Order>> {
        let orders = self
            .state()
            .orders
            .values()
            .filter(|o| o.supplier_id() == Some(supplier));
        Ok(Self::page_of(orders, page))
    }

    async fn inventory(&mut self, product: &ProductId) -> Result<Option<InventoryRecord>> {
        Ok(self.state().inventory.get(product).cloned())
    }

    async fn inventory_for_update(
        &mut self,
        product: &ProductId,
    ) -> Result<Option<InventoryRecord>> {
        // The transaction already holds the store-wide write lock.
        self.state_mut()?;
        self.inventory(product).await
    }

    async fn save_inventory(&mut self, record: &InventoryRecord) -> Result<()> {
        self.state_mut()?
            .inventory
            .insert(record.product_id.clone(), record.clone());
        Ok(())
    }

    async fn low_stock(&mut self) -> Result<Vec<InventoryRecord>> {
        Ok(self
            .state()
            .inventory
            .values()
            .filter(|r| r.is_low_stock())
            .cloned()
            .collect())
    }

    async fn record_reservation(&mut self, line: &ReservationLine) -> Result<()> {
        self.state_mut()?.reservations.push(line.clone());
        Ok(())
    }

    async fn open_reservations(&mut self, order_id: &OrderId) -> Result<Vec<ReservationLine>> {
        Ok(self
            .state()
            .reservations
            .iter()
            .filter(|l| &l.order_id == order_id && l.is_open())
            .cloned()
            .collect())
    }

    async fn mark_released(&mut self, order_id: &OrderId) -> Result<()> {
        let now = Utc::now();
        for line in self
            .state_mut()?
            .reservations
            .iter_mut()
            .filter(|l| &l.order_id == order_id && l.is_open())
        {
            line.released_at = Some(now);
        }
        Ok(())
    }

    async fn save_supplier(&mut self, supplier: &Supplier) -> Result<()> {
        self.state_mut()?
            .suppliers
            .insert(supplier.id.clone(), supplier.clone());
        Ok(())
    }

    async fn find_supplier_for(&mut self, products: &[ProductId]) -> Result<Option<Supplier>> {
        Ok(self
            .state()
            .suppliers
            .values()
            .find(|s| s.is_active && s.sells_any(products))
            .cloned())
    }

    async fn append_outbox(&mut self, record: &OutboxRecord) -> Result<()> {
        self.state_mut()?.outbox.push(record.clone());
        Ok(())
    }

    async fn outbox_for(&mut self, aggregate_id: &str) -> Result<Vec<OutboxRecord>> {
        Ok(self
            .state()
            .outbox
            .iter()
            .filter(|r| r.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if let InMemoryTransaction::Write { mut guard, working } = *self {
            *guard = working;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
