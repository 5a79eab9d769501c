//! Order intake: request validation, order creation and queries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CorrelationId, OrderId};
use domain::{
    Aggregate, CustomerId, IntegrationEvent, Money, Order, OrderItem, OrderReceivedEvent,
    OrderResponse, SupplierId,
};
use serde::{Deserialize, Serialize};
use store::{OutboxRecord, Page, Store, StoreExt};

use crate::error::{Result, SagaError};
use crate::services::{EventPublisher, publish_or_warn};

/// Source system recorded on orders created here.
pub const SOURCE_SYSTEM: &str = "ExternalOrderApi";

const MAX_ITEMS: usize = 100;
const MAX_QUANTITY: i64 = 10_000;
const MAX_UNIT_PRICE: f64 = 10_000.0;
const MAX_NOTES_CHARS: usize = 1000;
const MAX_ORDER_VALUE: Money = Money::from_dollars(100_000);

/// Body of `POST /orders`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub items: Vec<CreateOrderItemRequest>,
    #[serde(default)]
    pub delivery_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItemRequest {
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: f64,
}

impl CreateOrderRequest {
    /// Returns every problem with the request, empty if it is acceptable.
    pub fn problems(&self, today: DateTime<Utc>) -> Vec<String> {
        let mut problems = Vec::new();

        check_identifier(&self.customer_id, "Customer ID", &mut problems);

        if self.items.is_empty() {
            problems.push("At least one order item is required".to_string());
        } else if self.items.len() > MAX_ITEMS {
            problems.push("Maximum of 100 items allowed per order".to_string());
        }
        for item in &self.items {
            item.check(&mut problems);
        }

        if let Some(date) = self.delivery_date {
            if date.date_naive() < today.date_naive() {
                problems.push("Delivery date must be in the future".to_string());
            }
        }
        if let Some(notes) = &self.notes {
            if notes.chars().count() > MAX_NOTES_CHARS {
                problems.push("Notes cannot exceed 1000 characters".to_string());
            }
        }

        let total: f64 = self
            .items
            .iter()
            .map(|i| i.quantity as f64 * i.unit_price)
            .sum();
        if Money::from_decimal(total) > MAX_ORDER_VALUE {
            problems.push("Total order value cannot exceed $100,000".to_string());
        }

        problems
    }
}

impl CreateOrderItemRequest {
    fn check(&self, problems: &mut Vec<String>) {
        check_identifier(&self.product_id, "Product ID", problems);

        if self.quantity <= 0 {
            problems.push("Quantity must be greater than 0".to_string());
        } else if self.quantity > MAX_QUANTITY {
            problems.push("Quantity cannot exceed 10,000 units".to_string());
        }

        if self.unit_price.is_nan() || self.unit_price <= 0.0 {
            problems.push("Unit price must be greater than 0".to_string());
        } else if self.unit_price > MAX_UNIT_PRICE {
            problems.push("Unit price cannot exceed $10,000".to_string());
        } else if !has_at_most_two_decimals(self.unit_price) {
            problems.push("Unit price cannot have more than 2 decimal places".to_string());
        }
    }
}

fn check_identifier(value: &str, label: &str, problems: &mut Vec<String>) {
    if value.trim().is_empty() {
        problems.push(format!("{label} is required"));
        return;
    }
    let len = value.chars().count();
    if !(3..=50).contains(&len) {
        problems.push(format!("{label} must be between 3 and 50 characters"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        problems.push(format!(
            "{label} can only contain letters, numbers, hyphens, and underscores"
        ));
    }
}

fn has_at_most_two_decimals(value: f64) -> bool {
    let cents = value * 100.0;
    (cents - cents.round()).abs() < 1e-6
}

/// Accepts new orders and answers order queries.
pub struct OrderIntake {
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
}

impl OrderIntake {
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Stores a new order in `Received` and hands it to the pipeline.
    #[tracing::instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn create(&self, request: CreateOrderRequest) -> Result<OrderResponse> {
        let problems = request.problems(Utc::now());
        if !problems.is_empty() {
            tracing::info!(problems = problems.len(), "order request rejected");
            return Err(SagaError::InvalidRequest(problems));
        }

        let order_id = OrderId::generate();
        let correlation_id = CorrelationId::new();
        let mut order = Order::default();
        let mut events = order.execute(|o| {
            o.create(
                order_id.clone(),
                CustomerId::new(request.customer_id.clone()),
                Some(correlation_id.clone()),
            )
        })?;
        for item in &request.items {
            let quantity = u32::try_from(item.quantity)
                .map_err(|_| SagaError::invalid("Quantity cannot exceed 10,000 units"))?;
            let line = OrderItem::new(
                item.product_id.as_str(),
                item.product_name.clone().unwrap_or_default(),
                quantity,
                Money::from_decimal(item.unit_price),
            );
            events.extend(order.execute(|o| o.add_item(line))?);
        }
        order.set_delivery(request.delivery_date, request.delivery_address)?;
        order.set_notes(request.notes, None)?;
        order.metadata_mut().source_system = Some(SOURCE_SYSTEM.to_string());

        // 1. Write the order and its outbox records, holding the order's lock
        let mut tx = self.store.begin().await?;
        tx.load_order_for_update(&order_id).await?;
        tx.save_order(&order).await?;
        for event in &events {
            tx.append_outbox(&OutboxRecord::for_order_event(&order_id, event)?)
                .await?;
        }

        // 2. Hand it to the pipeline; an order nobody will process is not kept
        if let Err(e) = self.publisher.enqueue_order(&order).await {
            tx.rollback().await?;
            tracing::warn!(%order_id, error = %e, "enqueue failed, order discarded");
            return Err(e.into());
        }
        tx.commit().await?;

        // 3. Announce it
        let received = OrderReceivedEvent::new(&order, SOURCE_SYSTEM);
        publish_or_warn(self.publisher.as_ref(), IntegrationEvent::Received(received)).await;

        tracing::info!(
            %order_id,
            %correlation_id,
            total = %order.total_amount(),
            items = order.item_count(),
            "order received"
        );
        metrics::counter!("orders_received_total").increment(1);

        Ok(OrderResponse::from_order(&order))
    }

    /// Loads the full order.
    pub async fn get(&self, order_id: &OrderId) -> Result<Order> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| SagaError::OrderNotFound(order_id.clone()))
    }

    pub async fn status(&self, order_id: &OrderId) -> Result<OrderResponse> {
        Ok(OrderResponse::from_order(&self.get(order_id).await?))
    }

    pub async fn list_for_customer(
        &self,
        customer_id: &CustomerId,
        page: Page,
    ) -> Result<Vec<OrderResponse>> {
        let mut tx = self.store.begin_read().await?;
        let orders = tx.orders_for_customer(customer_id, page).await?;
        tx.commit().await?;
        Ok(orders.iter().map(OrderResponse::from_order).collect())
    }

    pub async fn list_for_supplier(
        &self,
        supplier_id: &SupplierId,
        page: Page,
    ) -> Result<Vec<OrderResponse>> {
        let mut tx = self.store.begin_read().await?;
        let orders = tx.orders_for_supplier(supplier_id, page).await?;
        tx.commit().await?;
        Ok(orders.iter().map(OrderResponse::from_order).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use domain::{OrderStatus, topics};
    use store::InMemoryStore;

    use super::*;
    use crate::services::InMemoryEventPublisher;

    fn valid_request() -> CreateOrderRequest {
        CreateOrderRequest {
            customer_id: "CUST-001".to_string(),
            items: vec![
                CreateOrderItemRequest {
                    product_id: "P-100".to_string(),
                    product_name: Some("Widget".to_string()),
                    quantity: 2,
                    unit_price: 25.0,
                },
                CreateOrderItemRequest {
                    product_id: "P-200".to_string(),
                    product_name: None,
                    quantity: 1,
                    unit_price: 50.0,
                },
            ],
            delivery_date: Some(Utc::now() + Duration::days(3)),
            delivery_address: Some("1 Main St".to_string()),
            notes: None,
        }
    }

    fn intake() -> (OrderIntake, InMemoryStore, InMemoryEventPublisher) {
        let store = InMemoryStore::new();
        let publisher = InMemoryEventPublisher::new();
        let intake = OrderIntake::new(Arc::new(store.clone()), Arc::new(publisher.clone()));
        (intake, store, publisher)
    }

    #[test]
    fn valid_request_has_no_problems() {
        assert!(valid_request().problems(Utc::now()).is_empty());
    }

    #[test]
    fn reports_every_problem() {
        let mut request = valid_request();
        request.customer_id = "C!".to_string();
        request.items[0].quantity = 0;
        request.items[1].unit_price = 10.005;
        request.delivery_date = Some(Utc::now() - Duration::days(2));

        let problems = request.problems(Utc::now());

        assert!(problems.contains(&"Customer ID must be between 3 and 50 characters".to_string()));
        assert!(problems.contains(
            &"Customer ID can only contain letters, numbers, hyphens, and underscores".to_string()
        ));
        assert!(problems.contains(&"Quantity must be greater than 0".to_string()));
        assert!(problems.contains(&"Unit price cannot have more than 2 decimal places".to_string()));
        assert!(problems.contains(&"Delivery date must be in the future".to_string()));
    }

    #[test]
    fn empty_request_names_missing_fields() {
        let problems = CreateOrderRequest::default().problems(Utc::now());
        assert_eq!(
            problems,
            vec![
                "Customer ID is required".to_string(),
                "At least one order item is required".to_string(),
            ]
        );
    }

    #[test]
    fn total_above_cap_is_rejected() {
        let mut request = valid_request();
        request.items[0].quantity = 10_000;
        request.items[0].unit_price = 10.01;
        assert!(
            request
                .problems(Utc::now())
                .contains(&"Total order value cannot exceed $100,000".to_string())
        );
    }

    #[tokio::test]
    async fn create_stores_and_enqueues_order() {
        let (intake, store, publisher) = intake();

        let response = intake.create(valid_request()).await.unwrap();

        assert_eq!(response.status, OrderStatus::Received);
        assert_eq!(response.message, "Order received and queued for processing");
        assert!(response.order_id.is_well_formed());

        let stored = store.find_order(&response.order_id).await.unwrap().unwrap();
        assert_eq!(stored.total_amount(), Money::from_dollars(100));
        assert_eq!(stored.metadata().source_system.as_deref(), Some(SOURCE_SYSTEM));
        assert!(stored.correlation_id().is_some());

        assert_eq!(publisher.enqueued_orders().await.len(), 1);
        assert_eq!(publisher.events_on(topics::ORDER_RECEIVED).await.len(), 1);
        assert!(store.outbox().await.iter().any(|r| r.event_type == "OrderReceived"));
    }

    #[tokio::test]
    async fn invalid_request_is_not_stored() {
        let (intake, store, publisher) = intake();
        let mut request = valid_request();
        request.items.clear();

        let err = intake.create(request).await.unwrap_err();

        assert!(err.is_invalid_input());
        assert_eq!(store.order_count().await, 0);
        assert!(publisher.enqueued_orders().await.is_empty());
    }

    #[tokio::test]
    async fn broker_outage_is_reported() {
        let (intake, _, publisher) = intake();
        publisher.set_fail_on_publish(true).await;

        let err = intake.create(valid_request()).await.unwrap_err();
        assert!(matches!(err, SagaError::Publish(_)));
    }

    #[tokio::test]
    async fn failed_enqueue_leaves_no_order_behind() {
        let (intake, store, publisher) = intake();
        publisher.set_fail_on_publish(true).await;

        intake.create(valid_request()).await.unwrap_err();

        assert_eq!(store.order_count().await, 0);
        assert!(store.outbox().await.is_empty());
        assert!(publisher.enqueued_orders().await.is_empty());

        publisher.set_fail_on_publish(false).await;
        let response = intake.create(valid_request()).await.unwrap();
        assert_eq!(store.order_count().await, 1);
        assert!(store.find_order(&response.order_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn status_of_unknown_order_is_not_found() {
        let (intake, _, _) = intake();
        let err = intake
            .status(&OrderId::new("ORD-20260101-00000000"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn lists_customer_orders() {
        let (intake, _, _) = intake();
        intake.create(valid_request()).await.unwrap();
        intake.create(valid_request()).await.unwrap();

        let orders = intake
            .list_for_customer(&CustomerId::new("CUST-001"), Page::default())
            .await
            .unwrap();
        assert_eq!(orders.len(), 2);

        let none = intake
            .list_for_customer(&CustomerId::new("CUST-404"), Page::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
