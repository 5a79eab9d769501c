//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::seed::SeedFile;
use bridge::Pipeline;
use domain::StaticCatalog;
use saga::LoggingSupplierNotifier;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, Store, StoreExt};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn open_store(config: &Config) -> Arc<dyn Store> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let store = PostgresStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            Arc::new(store)
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Open the store and load reference data
    let store = open_store(&config).await;
    let seed = match &config.catalog_path {
        Some(path) => SeedFile::load(path).expect("failed to load seed file"),
        None => {
            tracing::warn!("CATALOG_PATH not set, starting with an empty catalog");
            SeedFile::default()
        }
    };
    store.seed(&seed.store).await.expect("failed to seed store");
    let catalog = StaticCatalog::from_seed(seed.catalog);
    tracing::info!(
        customers = catalog.customer_count(),
        products = catalog.product_count(),
        "catalog loaded"
    );

    // 4. Wire services and start the pipeline workers
    let services = api::Services::build(
        &config,
        store,
        catalog,
        Arc::new(LoggingSupplierNotifier),
    )
    .expect("failed to build services");
    let cancel = CancellationToken::new();
    let pipeline = Pipeline::start(
        services.pipeline.clone(),
        config.worker_concurrency,
        cancel.clone(),
    )
    .await
    .expect("failed to start pipeline");

    // 5. Build the application
    let app = api::create_app(services.state.clone(), metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, workers = pipeline.workers(), "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop the workers once in-flight requests have drained
    cancel.cancel();
    pipeline.join().await;
    services.broker.close().await;

    tracing::info!("server shut down gracefully");
}
