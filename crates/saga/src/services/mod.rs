//! Outbound ports used by the saga and their in-memory implementations.

pub mod notifier;
pub mod publisher;

pub use notifier::{
    InMemorySupplierNotifier, LoggingSupplierNotifier, NotificationError, SupplierNotifier,
};
pub use publisher::{EventPublisher, InMemoryEventPublisher, PublishError, publish_or_warn};
