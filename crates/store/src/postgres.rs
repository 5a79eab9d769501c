use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MessageId, OrderId};
use domain::{CustomerId, Money, Order, ProductId, SupplierId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    InventoryRecord, OutboxRecord, Page, ReservationLine, Result, StoreError, Supplier,
    store::{Store, StoreTransaction},
};

const ORDER_COLUMNS: &str = "id, customer_id, customer_email, customer_phone, supplier_id, status, \
     currency, delivery_date, delivery_address, special_instructions, notes, metadata, \
     created_at, updated_at, confirmed_at";

const INVENTORY_COLUMNS: &str =
    "product_id, quantity_on_hand, quantity_reserved, reorder_level, last_updated";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn begin_read(&self) -> Result<Box<dyn StoreTransaction>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    /// Rebuilds orders from their rows plus every item row of those orders.
    async fn hydrate(&mut self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<std::result::Result<_, _>>()?;

        let item_rows = sqlx::query(
            r#"
            SELECT order_id, product_id, product_name, quantity, unit_price_cents, category
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut items: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
        for row in item_rows {
            let order_id: String = row.try_get("order_id")?;
            let quantity: i64 = row.try_get("quantity")?;
            let unit_price: i64 = row.try_get("unit_price_cents")?;
            items.entry(order_id).or_default().push(serde_json::json!({
                "productId": row.try_get::<String, _>("product_id")?,
                "productName": row.try_get::<String, _>("product_name")?,
                "quantity": quantity,
                "unitPrice": Money::from_cents(unit_price),
                "category": row.try_get::<Option<String>, _>("category")?,
            }));
        }

        rows.into_iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let order_items = items.remove(&id).unwrap_or_default();
                row_to_order(row, order_items)
            })
            .collect()
    }

    async fn list_orders(&mut self, filter: &str, key: &str, page: Page) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE {filter} = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(key)
            .bind(i64::from(page.size))
            .bind(page.offset() as i64)
            .fetch_all(&mut *self.tx)
            .await?;
        self.hydrate(rows).await
    }

    async fn read_inventory(
        &mut self,
        product: &ProductId,
        lock: bool,
    ) -> Result<Option<InventoryRecord>> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory WHERE product_id = $1{suffix}");
        let row = sqlx::query(&sql)
            .bind(product.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_inventory).transpose()
    }
}

fn row_to_order(row: PgRow, items: Vec<serde_json::Value>) -> Result<Order> {
    let id: String = row.try_get("id")?;
    let document = serde_json::json!({
        "id": &id,
        "customerId": row.try_get::<String, _>("customer_id")?,
        "customerEmail": row.try_get::<Option<String>, _>("customer_email")?,
        "customerPhone": row.try_get::<Option<String>, _>("customer_phone")?,
        "supplierId": row.try_get::<Option<String>, _>("supplier_id")?,
        "items": items,
        "status": row.try_get::<String, _>("status")?,
        "currency": row.try_get::<String, _>("currency")?,
        "deliveryDate": row.try_get::<Option<DateTime<Utc>>, _>("delivery_date")?,
        "deliveryAddress": row.try_get::<Option<String>, _>("delivery_address")?,
        "specialInstructions": row.try_get::<Option<String>, _>("special_instructions")?,
        "notes": row.try_get::<Option<String>, _>("notes")?,
        "metadata": row.try_get::<serde_json::Value, _>("metadata")?,
        "createdAt": row.try_get::<DateTime<Utc>, _>("created_at")?,
        "updatedAt": row.try_get::<DateTime<Utc>, _>("updated_at")?,
        "confirmedAt": row.try_get::<Option<DateTime<Utc>>, _>("confirmed_at")?,
    });
    serde_json::from_value(document).map_err(|e| StoreError::Corrupt {
        table: "orders",
        key: id,
        reason: e.to_string(),
    })
}

fn row_to_inventory(row: PgRow) -> Result<InventoryRecord> {
    Ok(InventoryRecord {
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        quantity_on_hand: row.try_get("quantity_on_hand")?,
        quantity_reserved: row.try_get("quantity_reserved")?,
        reorder_level: row.try_get("reorder_level")?,
        last_updated: row.try_get("last_updated")?,
    })
}

fn row_to_reservation(row: PgRow) -> Result<ReservationLine> {
    Ok(ReservationLine {
        order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        quantity: row.try_get("quantity")?,
        reserved_at: row.try_get("reserved_at")?,
        released_at: row.try_get("released_at")?,
    })
}

fn row_to_outbox(row: PgRow) -> Result<OutboxRecord> {
    Ok(OutboxRecord {
        id: MessageId::from(row.try_get::<Uuid, _>("id")?),
        aggregate_id: row.try_get("aggregate_id")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn load_order(&mut self, id: &OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let rows = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(self.hydrate(rows).await?.into_iter().next())
    }

    async fn load_order_for_update(&mut self, id: &OrderId) -> Result<Option<Order>> {
        // Row locks cannot cover an order that is not stored yet, so take a
        // transaction-scoped advisory lock on the id first.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(id.as_str())
            .execute(&mut *self.tx)
            .await?;

        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let rows = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(self.hydrate(rows).await?.into_iter().next())
    }

    async fn save_order(&mut self, order: &Order) -> Result<()> {
        let metadata = serde_json::to_value(order.metadata())?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, customer_email, customer_phone, supplier_id, status,
                                currency, total_amount_cents, delivery_date, delivery_address,
                                special_instructions, notes, metadata, created_at, updated_at, confirmed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                customer_email = EXCLUDED.customer_email,
                customer_phone = EXCLUDED.customer_phone,
                supplier_id = EXCLUDED.supplier_id,
                status = EXCLUDED.status,
                currency = EXCLUDED.currency,
                total_amount_cents = EXCLUDED.total_amount_cents,
                delivery_date = EXCLUDED.delivery_date,
                delivery_address = EXCLUDED.delivery_address,
                special_instructions = EXCLUDED.special_instructions,
                notes = EXCLUDED.notes,
                metadata = EXCLUDED.metadata,
                updated_at = EXCLUDED.updated_at,
                confirmed_at = EXCLUDED.confirmed_at
            "#,
        )
        .bind(order.id().as_str())
        .bind(order.customer_id().as_str())
        .bind(order.customer_email())
        .bind(order.customer_phone())
        .bind(order.supplier_id().map(|s| s.as_str()))
        .bind(order.status().as_str())
        .bind(order.currency().as_str())
        .bind(order.total_amount().cents())
        .bind(order.delivery_date())
        .bind(order.delivery_address())
        .bind(order.special_instructions())
        .bind(order.notes())
        .bind(metadata)
        .bind(order.created_at())
        .bind(order.updated_at())
        .bind(order.confirmed_at())
        .execute(&mut *self.tx)
        .await?;

        sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(order.id().as_str())
            .execute(&mut *self.tx)
            .await?;

        for (line_no, item) in order.items().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, line_no, product_id, product_name, quantity,
                                         unit_price_cents, category)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id().as_str())
            .bind(line_no as i32)
            .bind(item.product_id.as_str())
            .bind(&item.product_name)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.cents())
            .bind(item.category.as_deref())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn orders_for_customer(
        &mut self,
        customer: &CustomerId,
        page: Page,
    ) -> Result<Vec<Order>> {
        self.list_orders("customer_id", customer.as_str(), page).await
    }

    async fn orders_for_supplier(
        &mut self,
        supplier: &SupplierId,
        page: Page,
    ) -> Result<Vec<Order>> {
        self.list_orders("supplier_id", supplier.as_str(), page).await
    }

    async fn inventory(&mut self, product: &ProductId) -> Result<Option<InventoryRecord>> {
        self.read_inventory(product, false).await
    }

    async fn inventory_for_update(
        &mut self,
        product: &ProductId,
    ) -> Result<Option<InventoryRecord>> {
        self.read_inventory(product, true).await
    }

    async fn save_inventory(&mut self, record: &InventoryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory (product_id, quantity_on_hand, quantity_reserved, reorder_level, last_updated)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (product_id) DO UPDATE SET
                quantity_on_hand = EXCLUDED.quantity_on_hand,
                quantity_reserved = EXCLUDED.quantity_reserved,
                reorder_level = EXCLUDED.reorder_level,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(record.product_id.as_str())
        .bind(record.quantity_on_hand)
        .bind(record.quantity_reserved)
        .bind(record.reorder_level)
        .bind(record.last_updated)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn low_stock(&mut self) -> Result<Vec<InventoryRecord>> {
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory \
             WHERE quantity_on_hand - quantity_reserved <= reorder_level ORDER BY product_id"
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(row_to_inventory).collect()
    }

    async fn record_reservation(&mut self, line: &ReservationLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_reservations (order_id, product_id, quantity, reserved_at, released_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(line.order_id.as_str())
        .bind(line.product_id.as_str())
        .bind(line.quantity)
        .bind(line.reserved_at)
        .bind(line.released_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn open_reservations(&mut self, order_id: &OrderId) -> Result<Vec<ReservationLine>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, reserved_at, released_at
            FROM inventory_reservations
            WHERE order_id = $1 AND released_at IS NULL
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(row_to_reservation).collect()
    }

    async fn mark_released(&mut self, order_id: &OrderId) -> Result<()> {
        sqlx::query(
            "UPDATE inventory_reservations SET released_at = NOW() \
             WHERE order_id = $1 AND released_at IS NULL",
        )
        .bind(order_id.as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn save_supplier(&mut self, supplier: &Supplier) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO suppliers (id, name, email, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(supplier.id.as_str())
        .bind(&supplier.name)
        .bind(&supplier.email)
        .bind(supplier.is_active)
        .execute(&mut *self.tx)
        .await?;

        sqlx::query("DELETE FROM supplier_products WHERE supplier_id = $1")
            .bind(supplier.id.as_str())
            .execute(&mut *self.tx)
            .await?;

        let products: Vec<&str> = supplier.products.iter().map(|p| p.as_str()).collect();
        sqlx::query(
            r#"
            INSERT INTO supplier_products (supplier_id, product_id)
            SELECT $1, product_id FROM UNNEST($2::TEXT[]) AS product_id
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(supplier.id.as_str())
        .bind(&products)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_supplier_for(&mut self, products: &[ProductId]) -> Result<Option<Supplier>> {
        let wanted: Vec<&str> = products.iter().map(|p| p.as_str()).collect();
        let row = sqlx::query(
            r#"
            SELECT s.id, s.name, s.email, s.is_active
            FROM suppliers s
            WHERE s.is_active
              AND EXISTS (
                  SELECT 1 FROM supplier_products sp
                  WHERE sp.supplier_id = s.id AND sp.product_id = ANY($1)
              )
            ORDER BY s.id
            LIMIT 1
            "#,
        )
        .bind(&wanted)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.try_get("id")?;
        let sold: Vec<String> = sqlx::query_scalar(
            "SELECT product_id FROM supplier_products WHERE supplier_id = $1 ORDER BY product_id",
        )
        .bind(&id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(Some(Supplier {
            id: SupplierId::new(id),
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            is_active: row.try_get("is_active")?,
            products: sold.into_iter().map(ProductId::new).collect(),
        }))
    }

    async fn append_outbox(&mut self, record: &OutboxRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_events (id, aggregate_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.aggregate_id)
        .bind(&record.event_type)
        .bind(&record.payload)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn outbox_for(&mut self, aggregate_id: &str) -> Result<Vec<OutboxRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, aggregate_id, event_type, payload, created_at
            FROM order_events
            WHERE aggregate_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(aggregate_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(row_to_outbox).collect()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
