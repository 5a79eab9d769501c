//! Supplier notification port with logging and in-memory implementations.

use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::{Order, SupplierId};
use store::Supplier;
use thiserror::Error;
use tokio::sync::RwLock;

/// The supplier could not be told about an order.
#[derive(Debug, Clone, Error)]
#[error("supplier notification failed: {0}")]
pub struct NotificationError(pub String);

/// Trait for telling a supplier it has been assigned an order.
#[async_trait]
pub trait SupplierNotifier: Send + Sync {
    async fn notify_order(&self, supplier: &Supplier, order: &Order)
    -> Result<(), NotificationError>;
}

/// Notifier that only writes each assignment to the log.
///
/// Keeps nothing in memory, so it is safe for long-running processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSupplierNotifier;

#[async_trait]
impl SupplierNotifier for LoggingSupplierNotifier {
    async fn notify_order(
        &self,
        supplier: &Supplier,
        order: &Order,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            supplier_id = %supplier.id,
            supplier_email = %supplier.email,
            order_id = %order.id(),
            total = %order.total_amount(),
            "supplier notified"
        );
        metrics::counter!("supplier_notifications_total").increment(1);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<(SupplierId, OrderId)>,
    fail_on_notify: bool,
}

/// In-memory notifier that logs and records every notification, for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySupplierNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemorySupplierNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every call.
    pub async fn set_fail_on_notify(&self, fail: bool) {
        self.state.write().await.fail_on_notify = fail;
    }

    /// Returns the (supplier, order) pairs notified so far.
    pub async fn sent(&self) -> Vec<(SupplierId, OrderId)> {
        self.state.read().await.sent.clone()
    }
}

#[async_trait]
impl SupplierNotifier for InMemorySupplierNotifier {
    async fn notify_order(
        &self,
        supplier: &Supplier,
        order: &Order,
    ) -> Result<(), NotificationError> {
        let mut state = self.state.write().await;
        if state.fail_on_notify {
            return Err(NotificationError(format!(
                "supplier {} did not accept the notification",
                supplier.id
            )));
        }
        tracing::info!(
            supplier_id = %supplier.id,
            order_id = %order.id(),
            total = %order.total_amount(),
            "supplier notified"
        );
        state.sent.push((supplier.id.clone(), order.id().clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use domain::{Aggregate, CustomerId, Money, OrderItem, ProductId};

    use super::*;

    fn assignment() -> (Supplier, Order) {
        let supplier = Supplier {
            id: SupplierId::new("SUP-001"),
            name: "Main Supplier".to_string(),
            email: "supply@example.com".to_string(),
            is_active: true,
            products: vec![ProductId::new("P1")],
        };
        let mut order = Order::default();
        order
            .execute(|o| o.create(OrderId::new("ORD-1"), CustomerId::new("CUST-001"), None))
            .unwrap();
        order
            .execute(|o| o.add_item(OrderItem::new("P1", "Widget", 1, Money::from_dollars(25))))
            .unwrap();
        (supplier, order)
    }

    #[tokio::test]
    async fn logging_notifier_always_succeeds() {
        let (supplier, order) = assignment();
        let notifier = LoggingSupplierNotifier;

        for _ in 0..3 {
            notifier.notify_order(&supplier, &order).await.unwrap();
        }
    }

    #[tokio::test]
    async fn in_memory_notifier_records_and_fails_on_demand() {
        let (supplier, order) = assignment();
        let notifier = InMemorySupplierNotifier::new();

        notifier.notify_order(&supplier, &order).await.unwrap();
        notifier.set_fail_on_notify(true).await;
        assert!(notifier.notify_order(&supplier, &order).await.is_err());

        let sent = notifier.sent().await;
        assert_eq!(sent, vec![(SupplierId::new("SUP-001"), OrderId::new("ORD-1"))]);
    }
}
