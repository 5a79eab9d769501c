//! Order orchestration saga.
//!
//! This crate provides:
//! - The inventory reservation engine (all-or-nothing reserve, idempotent release)
//! - The order orchestrator that confirms or fails an enriched order and cancels orders
//! - Order intake and queries for the synchronous boundary
//! - Ports for supplier notification and integration-event publishing
//!
//! An order goes through the orchestrator in one store transaction; integration
//! events are announced after the commit, and the outbox keeps the durable record.

pub mod error;
pub mod escalation;
pub mod intake;
pub mod orchestrator;
pub mod reservation;
pub mod services;

pub use error::{Result, SagaError};
pub use escalation::HighValueEscalator;
pub use intake::{CreateOrderItemRequest, CreateOrderRequest, OrderIntake};
pub use orchestrator::OrderOrchestrator;
pub use reservation::{
    AdjustmentOutcome, InvalidAdjustment, ReservationEngine, ReservationRequest,
    ReservationResult,
};
pub use services::{
    EventPublisher, InMemoryEventPublisher, InMemorySupplierNotifier, LoggingSupplierNotifier,
    NotificationError, PublishError, SupplierNotifier, publish_or_warn,
};
