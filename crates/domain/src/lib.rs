//! Domain layer for the order orchestration system.
//!
//! This crate provides:
//! - The `Order` aggregate with its status machine and pricing invariants
//! - Validation and enrichment engines behind async provider ports
//! - Integration events and the stage messages exchanged by the pipeline

pub mod aggregate;
pub mod catalog;
pub mod enrichment;
pub mod error;
pub mod integration;
pub mod order;
pub mod providers;
pub mod validation;

pub use aggregate::{Aggregate, DomainEvent};
pub use catalog::{CatalogSeed, StaticCatalog};
pub use enrichment::{EnrichmentResult, OrderEnricher};
pub use error::DomainError;
pub use integration::{
    CustomerTier, EventHeader, HighValueErrorEvent, IntegrationEvent, OrderConfirmedEvent,
    OrderEnrichmentResponse, OrderFailedEvent, OrderProcessedEvent, OrderReceivedEvent,
    OrderResponse, OrderValidationResponse, ProcessOrderRequest, topics,
};
pub use order::{
    Currency, CustomerId, DEFAULT_HIGH_VALUE_THRESHOLD, Money, Order, OrderError, OrderEvent,
    OrderItem, OrderMetadata, OrderStatus, ProductId, SupplierId,
};
pub use providers::{
    CustomerDirectory, CustomerRecord, DeliveryQuote, ExternalDataService, ProductCatalog,
    ProductRecord, ProviderError,
};
pub use validation::{OrderValidator, ValidationError, ValidationResult, ValidationSettings};
