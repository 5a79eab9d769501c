//! HTTP API server and pipeline host for the order orchestration system.
//!
//! Exposes order intake, status queries, cancellation, the internal processing
//! endpoint and inventory operations over REST, and wires the queue pipeline
//! that carries accepted orders through validation, enrichment and processing.

pub mod config;
pub mod error;
pub mod routes;
pub mod seed;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use bridge::{
    BridgeError, BrokerEventPublisher, HttpInternalApiClient, InMemoryBroker, InternalApiClient,
    LocalApiClient, PipelineDeps,
};
use domain::{OrderEnricher, OrderValidator, StaticCatalog};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    HighValueEscalator, OrderIntake, OrderOrchestrator, ReservationEngine, SupplierNotifier,
};
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Source name stamped on events raised by the HTTP surface.
pub const SOURCE: &str = "ExternalOrderApi";

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub intake: OrderIntake,
    pub orchestrator: Arc<OrderOrchestrator>,
    pub inventory: ReservationEngine,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/orders", post(routes::orders::create))
        .route(
            "/orders/{id}",
            get(routes::orders::get)
                .post(routes::orders::process)
                .delete(routes::orders::cancel),
        )
        .route("/orders/{id}/status", get(routes::orders::status))
        .route(
            "/customers/{id}/orders",
            get(routes::orders::list_for_customer),
        )
        .route(
            "/suppliers/{id}/orders",
            get(routes::orders::list_for_supplier),
        )
        .route("/inventory/low-stock", get(routes::inventory::low_stock))
        .route(
            "/inventory/{product_id}",
            get(routes::inventory::get).patch(routes::inventory::adjust),
        )
        .route("/inventory/reserve", post(routes::inventory::reserve))
        .route(
            "/inventory/reserve/{order_id}",
            axum::routing::delete(routes::inventory::release),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Everything the server and the pipeline share.
pub struct Services {
    pub state: Arc<AppState>,
    pub broker: InMemoryBroker,
    pub pipeline: PipelineDeps,
}

impl Services {
    /// Wires the services over `store` and `catalog`, telling suppliers about
    /// their orders through `notifier`.
    ///
    /// Orders are processed through the HTTP client when `INTERNAL_API_URL` is
    /// set and by the in-process orchestrator otherwise.
    pub fn build(
        config: &Config,
        store: Arc<dyn Store>,
        catalog: StaticCatalog,
        notifier: Arc<dyn SupplierNotifier>,
    ) -> Result<Self, BridgeError> {
        // 1. Messaging
        let broker = InMemoryBroker::new(config.broker_settings());
        let events = Arc::new(BrokerEventPublisher::new(Arc::new(broker.clone()), SOURCE));
        let escalator =
            HighValueEscalator::with_threshold(events.clone(), config.high_value_threshold);

        // 2. Order services
        let orchestrator = Arc::new(OrderOrchestrator::new(
            store.clone(),
            notifier,
            events.clone(),
            escalator.clone(),
        ));
        let state = Arc::new(AppState {
            intake: OrderIntake::new(store.clone(), events.clone()),
            orchestrator: orchestrator.clone(),
            inventory: ReservationEngine::new(store.clone()),
        });

        // 3. Pipeline stages
        let catalog = Arc::new(catalog);
        let client: Arc<dyn InternalApiClient> = match config.api_client_config() {
            Some(client_config) => {
                tracing::info!(base_url = %client_config.base_url, "processing orders over HTTP");
                Arc::new(HttpInternalApiClient::new(client_config)?)
            }
            None => Arc::new(LocalApiClient::new(orchestrator)),
        };
        let pipeline = PipelineDeps {
            store,
            broker: Arc::new(broker.clone()),
            events,
            validator: Arc::new(OrderValidator::with_settings(
                catalog.clone(),
                catalog.clone(),
                config.validation_settings(),
            )),
            enricher: Arc::new(OrderEnricher::new(catalog)),
            escalator,
            client,
        };

        Ok(Self {
            state,
            broker,
            pipeline,
        })
    }
}
