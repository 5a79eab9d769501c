//! Queue bridge for the order pipeline.
//!
//! This crate provides:
//! - A broker port with an in-memory implementation (delivery counting, TTL, dead-letter queues)
//! - The message envelope every topic carries
//! - A worker pool that settles each message by the handler's retry classification
//! - The validation, enrichment, dispatch and processing stage consumers
//! - Clients for the internal processing endpoint (HTTP and in-process)
//!
//! Handlers never retry on their own: a retryable error is nak'd and the
//! broker redelivers until its delivery count runs out.

pub mod broker;
pub mod client;
pub mod envelope;
pub mod error;
pub mod pipeline;
pub mod publisher;
pub mod stages;
pub mod worker;

pub use broker::{
    BrokerExt, BrokerSettings, DEFAULT_GROUP, DeadLetter, Delivery, InMemoryBroker,
    MessageBroker, Subscription,
};
pub use client::{ApiClientConfig, HttpInternalApiClient, InternalApiClient, LocalApiClient};
pub use envelope::{Envelope, message_types};
pub use error::{BridgeError, BrokerError, BrokerResult, Result};
pub use pipeline::{Pipeline, PipelineDeps};
pub use publisher::BrokerEventPublisher;
pub use stages::{DispatchStage, EnrichmentStage, ProcessingStage, ValidationStage};
pub use worker::{MessageHandler, WorkerPool, consume};
