//! Wiring of the four stage consumers onto their topics.

use std::sync::Arc;

use domain::{OrderEnricher, OrderValidator, topics};
use saga::{EventPublisher, HighValueEscalator};
use store::Store;
use tokio_util::sync::CancellationToken;

use crate::broker::{DEFAULT_GROUP, MessageBroker};
use crate::client::InternalApiClient;
use crate::error::BrokerResult;
use crate::stages::{DispatchStage, EnrichmentStage, ProcessingStage, ValidationStage};
use crate::worker::{MessageHandler, WorkerPool};

/// Everything the stage consumers need.
#[derive(Clone)]
pub struct PipelineDeps {
    pub store: Arc<dyn Store>,
    pub broker: Arc<dyn MessageBroker>,
    pub events: Arc<dyn EventPublisher>,
    pub validator: Arc<OrderValidator>,
    pub enricher: Arc<OrderEnricher>,
    pub escalator: HighValueEscalator,
    pub client: Arc<dyn InternalApiClient>,
}

/// Running worker pools for every stage.
pub struct Pipeline {
    pools: Vec<WorkerPool>,
}

impl Pipeline {
    /// Subscribes each stage to its topic and starts `concurrency` workers per stage.
    pub async fn start(
        deps: PipelineDeps,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> BrokerResult<Self> {
        let stages: [(&str, Arc<dyn MessageHandler>); 4] = [
            (
                topics::ORDER_RECEIVED,
                Arc::new(ValidationStage::new(
                    deps.store.clone(),
                    deps.validator.clone(),
                    deps.escalator.clone(),
                    deps.broker.clone(),
                    deps.events.clone(),
                )),
            ),
            (
                topics::ORDER_VALIDATED,
                Arc::new(EnrichmentStage::new(
                    deps.store.clone(),
                    deps.enricher.clone(),
                    deps.broker.clone(),
                    deps.events.clone(),
                )),
            ),
            (
                topics::ORDER_ENRICHED,
                Arc::new(DispatchStage::new(
                    deps.store.clone(),
                    deps.broker.clone(),
                    deps.events.clone(),
                )),
            ),
            (
                topics::ORDER_PROCESSING,
                Arc::new(ProcessingStage::new(deps.client.clone(), deps.events.clone())),
            ),
        ];

        let mut pools = Vec::with_capacity(stages.len());
        for (topic, handler) in stages {
            pools.push(
                WorkerPool::spawn(
                    deps.broker.as_ref(),
                    topic,
                    DEFAULT_GROUP,
                    handler,
                    concurrency,
                    cancel.clone(),
                )
                .await?,
            );
        }
        tracing::info!(concurrency, "order pipeline started");
        Ok(Self { pools })
    }

    /// Total number of worker tasks.
    pub fn workers(&self) -> usize {
        self.pools.iter().map(WorkerPool::len).sum()
    }

    /// Waits for every worker to stop.
    pub async fn join(self) {
        for pool in self.pools {
            pool.join().await;
        }
        tracing::info!("order pipeline stopped");
    }
}
