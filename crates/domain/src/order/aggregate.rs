//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CorrelationId, OrderId};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{
    Currency, CustomerId, Money, OrderError, OrderEvent, OrderItem, OrderMetadata, OrderStatus,
    ProductId, SupplierId,
    events::{ItemAddedData, ItemQuantityUpdatedData, OrderReceivedData},
};

/// Default value above which an order counts as high value.
pub const DEFAULT_HIGH_VALUE_THRESHOLD: Money = Money::from_dollars(1000);

/// Order aggregate root.
///
/// Created in `Received` by intake, advanced by the pipeline stages and finally
/// confirmed or failed by the orchestrator. The total amount is never stored
/// independently of the items: it is recomputed on every item change and on
/// deserialization, so it always equals the sum of the line totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "OrderDocument")]
pub struct Order {
    id: OrderId,
    customer_id: CustomerId,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    supplier_id: Option<SupplierId>,
    items: Vec<OrderItem>,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    delivery_date: Option<DateTime<Utc>>,
    delivery_address: Option<String>,
    special_instructions: Option<String>,
    notes: Option<String>,
    currency: Currency,
    total_amount: Money,
    metadata: OrderMetadata,
}

/// Wire shape of an order; anything missing falls back to a neutral default so
/// that validation can report it instead of deserialization rejecting it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderDocument {
    #[serde(default)]
    id: OrderId,
    #[serde(default)]
    customer_id: CustomerId,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    customer_phone: Option<String>,
    #[serde(default)]
    supplier_id: Option<SupplierId>,
    #[serde(default)]
    items: Vec<OrderItem>,
    #[serde(default)]
    status: OrderStatus,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    delivery_date: Option<DateTime<Utc>>,
    #[serde(default)]
    delivery_address: Option<String>,
    #[serde(default)]
    special_instructions: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    currency: Currency,
    #[serde(default)]
    metadata: OrderMetadata,
}

impl From<OrderDocument> for Order {
    fn from(doc: OrderDocument) -> Self {
        let mut order = Order {
            id: doc.id,
            customer_id: doc.customer_id,
            customer_email: doc.customer_email,
            customer_phone: doc.customer_phone,
            supplier_id: doc.supplier_id,
            items: doc.items,
            status: doc.status,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            confirmed_at: doc.confirmed_at,
            delivery_date: doc.delivery_date,
            delivery_address: doc.delivery_address,
            special_instructions: doc.special_instructions,
            notes: doc.notes,
            currency: doc.currency,
            total_amount: Money::zero(),
            metadata: doc.metadata,
        };
        for item in &mut order.items {
            item.unit_price = item.unit_price.with_currency(order.currency);
        }
        order.recalculate_total();
        order
    }
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderReceived(data) => self.apply_order_received(data),
            OrderEvent::ItemAdded(data) => self.apply_item_added(data),
            OrderEvent::ItemRemoved(data) => self.apply_item_removed(&data.product_id),
            OrderEvent::ItemQuantityUpdated(data) => self.apply_item_quantity_updated(data),
            OrderEvent::StatusChanged(data) => {
                self.status = data.to;
                self.updated_at = data.changed_at;
            }
            OrderEvent::OrderConfirmed(data) => {
                self.status = OrderStatus::Confirmed;
                self.supplier_id = Some(data.supplier_id);
                self.confirmed_at = Some(data.confirmed_at);
                self.updated_at = data.confirmed_at;
            }
            OrderEvent::OrderFailed(data) => {
                self.status = OrderStatus::Failed;
                self.metadata.failure_reason = Some(data.reason);
                self.updated_at = data.failed_at;
            }
            OrderEvent::OrderCancelled(data) => {
                self.status = OrderStatus::Cancelled;
                self.metadata.cancellation_reason = Some(data.reason);
                self.metadata.cancelled_at = Some(data.cancelled_at);
                self.updated_at = data.cancelled_at;
            }
            OrderEvent::OrderDelivered(data) => {
                self.status = OrderStatus::Delivered;
                self.updated_at = data.delivered_at;
            }
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> &OrderId {
        &self.id
    }

    pub fn customer_id(&self) -> &CustomerId {
        &self.customer_id
    }

    pub fn customer_email(&self) -> Option<&str> {
        self.customer_email.as_deref()
    }

    pub fn customer_phone(&self) -> Option<&str> {
        self.customer_phone.as_deref()
    }

    pub fn supplier_id(&self) -> Option<&SupplierId> {
        self.supplier_id.as_ref()
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns all items in insertion order.
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Returns an item by product ID.
    pub fn get_item(&self, product_id: &ProductId) -> Option<&OrderItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    /// Returns the number of order lines.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Returns the total quantity of all items.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Returns the total amount.
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns true if the order has items.
    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn delivery_date(&self) -> Option<DateTime<Utc>> {
        self.delivery_date
    }

    pub fn delivery_address(&self) -> Option<&str> {
        self.delivery_address.as_deref()
    }

    pub fn special_instructions(&self) -> Option<&str> {
        self.special_instructions.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn metadata(&self) -> &OrderMetadata {
        &self.metadata
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.metadata.correlation_id.as_ref()
    }

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_be_cancelled(&self) -> bool {
        self.status.can_cancel()
    }

    /// Returns true if the total strictly exceeds `threshold`.
    pub fn is_high_value(&self, threshold: Money) -> bool {
        self.total_amount.cents() > threshold.cents()
    }

    /// Checks that the order has lines and that each one could have been added.
    ///
    /// Orders rebuilt from their wire shape skip the [`Order::add_item`] guards.
    pub fn check_lines(&self) -> Result<(), OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        self.items.iter().try_for_each(check_line)
    }
}

// Annotation methods (allowed in any state, never touch items or totals)
impl Order {
    pub fn metadata_mut(&mut self) -> &mut OrderMetadata {
        &mut self.metadata
    }

    pub fn set_customer_contact(&mut self, email: Option<String>, phone: Option<String>) {
        if email.is_some() {
            self.customer_email = email;
        }
        if phone.is_some() {
            self.customer_phone = phone;
        }
    }

    /// Sets the display name and category of every line for `product_id`.
    pub fn annotate_item(
        &mut self,
        product_id: &ProductId,
        product_name: impl Into<String>,
        category: Option<String>,
    ) {
        let product_name = product_name.into();
        for item in self.items.iter_mut().filter(|i| &i.product_id == product_id) {
            item.product_name = product_name.clone();
            item.category = category.clone();
        }
    }
}

// Command methods (return events)
impl Order {
    /// Accepts a new order for a customer.
    pub fn create(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
        correlation_id: Option<CorrelationId>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.id.is_empty() {
            return Err(OrderError::AlreadyCreated);
        }
        if order_id.is_empty() {
            return Err(OrderError::OrderIdRequired);
        }
        if customer_id.is_empty() {
            return Err(OrderError::CustomerIdRequired);
        }

        Ok(vec![OrderEvent::order_received(
            order_id,
            customer_id,
            correlation_id,
        )])
    }

    /// Sets delivery details while the order is still being received.
    pub fn set_delivery(
        &mut self,
        delivery_date: Option<DateTime<Utc>>,
        delivery_address: Option<String>,
    ) -> Result<(), OrderError> {
        self.ensure(self.status.can_modify_items(), "set delivery details")?;
        self.delivery_date = delivery_date;
        self.delivery_address = delivery_address;
        Ok(())
    }

    /// Sets free-text notes while the order is still being received.
    pub fn set_notes(
        &mut self,
        notes: Option<String>,
        special_instructions: Option<String>,
    ) -> Result<(), OrderError> {
        self.ensure(self.status.can_modify_items(), "set notes")?;
        self.notes = notes;
        self.special_instructions = special_instructions;
        Ok(())
    }

    /// Adds an item to the order.
    ///
    /// If the product is already on the order, increases its quantity instead.
    pub fn add_item(&self, item: OrderItem) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure(self.status.can_modify_items(), "add item")?;
        check_line(&item)?;

        if let Some(existing) = self.get_item(&item.product_id) {
            let new_quantity = existing.quantity + item.quantity;
            Ok(vec![OrderEvent::item_quantity_updated(
                item.product_id,
                existing.quantity,
                new_quantity,
            )])
        } else {
            Ok(vec![OrderEvent::item_added(&item)])
        }
    }

    /// Removes an item from the order.
    pub fn remove_item(&self, product_id: ProductId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure(self.status.can_modify_items(), "remove item")?;

        if self.get_item(&product_id).is_none() {
            return Err(OrderError::ItemNotFound {
                product_id: product_id.to_string(),
            });
        }

        Ok(vec![OrderEvent::item_removed(product_id)])
    }

    /// Updates the quantity of an existing item.
    pub fn update_item_quantity(
        &self,
        product_id: ProductId,
        new_quantity: u32,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure(self.status.can_modify_items(), "update item quantity")?;

        let existing = self
            .get_item(&product_id)
            .ok_or_else(|| OrderError::ItemNotFound {
                product_id: product_id.to_string(),
            })?;

        if new_quantity == 0 {
            Ok(vec![OrderEvent::item_removed(product_id)])
        } else if new_quantity != existing.quantity {
            Ok(vec![OrderEvent::item_quantity_updated(
                product_id,
                existing.quantity,
                new_quantity,
            )])
        } else {
            Ok(vec![])
        }
    }

    pub fn start_validation(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.move_to(
            self.status.can_start_validation(),
            "start validation",
            OrderStatus::Validating,
        )
    }

    pub fn complete_validation(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.move_to(
            self.status.can_complete_validation(),
            "complete validation",
            OrderStatus::Validated,
        )
    }

    pub fn start_enrichment(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.move_to(
            self.status.can_start_enrichment(),
            "start enrichment",
            OrderStatus::Enriching,
        )
    }

    pub fn complete_enrichment(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.move_to(
            self.status.can_complete_enrichment(),
            "complete enrichment",
            OrderStatus::Enriched,
        )
    }

    pub fn start_processing(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.move_to(
            self.status.can_start_processing(),
            "start processing",
            OrderStatus::Processing,
        )
    }

    /// Assigns the supplier and confirms the order.
    pub fn confirm(&self, supplier_id: SupplierId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure(self.status.can_confirm(), "confirm")?;

        Ok(vec![OrderEvent::order_confirmed(
            self.id.clone(),
            supplier_id,
            self.total_amount,
        )])
    }

    /// Fails the order from the stage currently running.
    pub fn fail(&self, reason: impl Into<String>) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure(self.status.can_fail(), "fail")?;

        Ok(vec![OrderEvent::order_failed(self.status, reason)])
    }

    /// Cancels the order.
    pub fn cancel(&self, reason: impl Into<String>) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure(self.status.can_cancel(), "cancel")?;

        Ok(vec![OrderEvent::order_cancelled(reason)])
    }

    pub fn mark_delivered(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure(self.status.can_deliver(), "mark delivered")?;

        Ok(vec![OrderEvent::order_delivered()])
    }

    fn ensure(&self, allowed: bool, action: &'static str) -> Result<(), OrderError> {
        if allowed {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition {
                current_state: self.status,
                action,
            })
        }
    }

    fn move_to(
        &self,
        allowed: bool,
        action: &'static str,
        to: OrderStatus,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure(allowed, action)?;
        Ok(vec![OrderEvent::status_changed(self.status, to)])
    }
}

// Apply event helpers
impl Order {
    fn apply_order_received(&mut self, data: OrderReceivedData) {
        self.id = data.order_id;
        self.customer_id = data.customer_id;
        self.status = OrderStatus::Received;
        self.created_at = data.received_at;
        self.updated_at = data.received_at;
        if data.correlation_id.is_some() {
            self.metadata.correlation_id = data.correlation_id;
        }
    }

    fn apply_item_added(&mut self, data: ItemAddedData) {
        let item = OrderItem::new(
            data.product_id,
            data.product_name,
            data.quantity,
            data.unit_price.with_currency(self.currency),
        );
        self.items.push(item);
        self.recalculate_total();
    }

    fn apply_item_removed(&mut self, product_id: &ProductId) {
        self.items.retain(|item| &item.product_id != product_id);
        self.recalculate_total();
    }

    fn apply_item_quantity_updated(&mut self, data: ItemQuantityUpdatedData) {
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|item| item.product_id == data.product_id)
        {
            item.quantity = data.new_quantity;
        }
        self.recalculate_total();
    }

    fn recalculate_total(&mut self) {
        self.total_amount = self
            .items
            .iter()
            .map(OrderItem::total_price)
            .sum::<Money>()
            .with_currency(self.currency);
    }
}

fn check_line(item: &OrderItem) -> Result<(), OrderError> {
    if item.quantity == 0 {
        return Err(OrderError::InvalidQuantity {
            quantity: item.quantity,
        });
    }
    if item.unit_price.cents() < 1 {
        return Err(OrderError::InvalidPrice {
            price: item.unit_price.cents(),
        });
    }
    Ok(())
}
