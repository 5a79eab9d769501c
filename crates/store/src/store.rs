use async_trait::async_trait;
use common::OrderId;
use domain::{CustomerId, Order, ProductId, SupplierId};

use crate::{InventoryRecord, OutboxRecord, Page, ReservationLine, Result, StoreSeed, Supplier};

/// Entry point to a persistence backend.
///
/// Every read and write goes through a [`StoreTransaction`]; nothing a
/// transaction writes is visible to others until [`StoreTransaction::commit`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a new transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Opens a transaction that is only used for reads.
    ///
    /// Backends that serialize writers can let readers share access here.
    /// Writes made through the returned transaction may be rejected.
    async fn begin_read(&self) -> Result<Box<dyn StoreTransaction>> {
        self.begin().await
    }
}

/// A unit of work against the store.
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Loads an order with its items.
    async fn load_order(&mut self, id: &OrderId) -> Result<Option<Order>>;

    /// Loads an order and locks it until the transaction ends.
    ///
    /// The lock is taken even when no such order exists yet, so two
    /// transactions adopting the same new order also run one after the other.
    async fn load_order_for_update(&mut self, id: &OrderId) -> Result<Option<Order>>;

    /// Inserts the order, or replaces the stored row and items if it exists.
    async fn save_order(&mut self, order: &Order) -> Result<()>;

    /// Orders placed by a customer, newest first.
    async fn orders_for_customer(&mut self, customer: &CustomerId, page: Page)
    -> Result<Vec<Order>>;

    /// Orders assigned to a supplier, newest first.
    async fn orders_for_supplier(&mut self, supplier: &SupplierId, page: Page)
    -> Result<Vec<Order>>;

    /// Reads a stock record without locking it.
    async fn inventory(&mut self, product: &ProductId) -> Result<Option<InventoryRecord>>;

    /// Reads a stock record and locks it until the transaction ends.
    async fn inventory_for_update(&mut self, product: &ProductId)
    -> Result<Option<InventoryRecord>>;

    async fn save_inventory(&mut self, record: &InventoryRecord) -> Result<()>;

    /// Records whose available quantity is at or below their reorder level.
    async fn low_stock(&mut self) -> Result<Vec<InventoryRecord>>;

    async fn record_reservation(&mut self, line: &ReservationLine) -> Result<()>;

    /// Reservation lines of an order that have not been released yet.
    async fn open_reservations(&mut self, order_id: &OrderId) -> Result<Vec<ReservationLine>>;

    /// Stamps every open reservation line of an order as released.
    async fn mark_released(&mut self, order_id: &OrderId) -> Result<()>;

    async fn save_supplier(&mut self, supplier: &Supplier) -> Result<()>;

    /// First active supplier, by id, that sells at least one of `products`.
    async fn find_supplier_for(&mut self, products: &[ProductId]) -> Result<Option<Supplier>>;

    async fn append_outbox(&mut self, record: &OutboxRecord) -> Result<()>;

    /// Outbox records written for an aggregate, oldest first.
    async fn outbox_for(&mut self, aggregate_id: &str) -> Result<Vec<OutboxRecord>>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Extension trait providing single-statement conveniences.
#[async_trait]
pub trait StoreExt: Store {
    /// Loads an order in a transaction of its own.
    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>> {
        let mut tx = self.begin_read().await?;
        let order = tx.load_order(id).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Saves an order in a transaction of its own.
    async fn put_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.begin().await?;
        tx.save_order(order).await?;
        tx.commit().await
    }

    /// Loads suppliers and stock records, replacing any with the same key.
    async fn seed(&self, seed: &StoreSeed) -> Result<()> {
        let mut tx = self.begin().await?;
        for supplier in &seed.suppliers {
            tx.save_supplier(supplier).await?;
        }
        for record in &seed.inventory {
            tx.save_inventory(record).await?;
        }
        tx.commit().await?;
        tracing::info!(
            suppliers = seed.suppliers.len(),
            products = seed.inventory.len(),
            "store seeded"
        );
        Ok(())
    }
}

// Blanket implementation for all Store implementations
impl<T: Store + ?Sized> StoreExt for T {}
