use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storefront_orders::clock::SystemClock;
use storefront_orders::config::AppConfig;
use storefront_orders::domain::order::OrderLifecycleService;
use storefront_orders::domain::pricing::PricingCalculator;
use storefront_orders::metrics::{self, Metrics};
use storefront_orders::store::PgStore;
use storefront_orders::utils::{retry_with_backoff, RetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,storefront_orders=debug"))
        )
        .init();

    tracing::info!("🚀 Starting storefront order service");

    // === 1. Configuration ===
    let config = AppConfig::from_env()?;
    tracing::info!(
        currency = %config.orders.currency,
        tax_rate = %config.orders.pricing.tax_rate,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );

    // === 2. Postgres pool (the database may still be starting) ===
    tracing::info!("Connecting to Postgres...");
    let pool = retry_with_backoff(RetryConfig::startup(), |attempt| {
        let options = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(config.connect_timeout());
        let url = config.database.url.clone();
        async move {
            tracing::debug!(attempt = attempt, "Opening connection pool");
            options.connect(&url).await
        }
    })
    .await
    .into_result()?;

    let store = PgStore::new(pool);
    store.migrate().await?;
    tracing::info!("✅ Database migrations applied");

    // === 3. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // actix-web gets its own runtime on a dedicated thread
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(error = %e, "Could not start metrics runtime");
                return;
            }
        };
        rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(metrics_registry, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 4. Order lifecycle service ===
    let service = OrderLifecycleService::new(
        Arc::new(store),
        Arc::new(SystemClock),
        PricingCalculator::new(config.orders.pricing.clone()),
        config.orders.lifecycle_settings(),
    )
    .with_metrics(metrics.clone());

    // This binary hosts no request transport. The HTTP checkout and admin
    // handlers own the service when they are mounted; until then it stays
    // alive here so its store pool and metrics outlive startup.
    tracing::info!(
        currency = %config.orders.currency,
        metrics_port = config.metrics_port,
        "🎉 Order service ready, awaiting an HTTP layer to take ownership"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("👋 Shutting down");
    drop(service);

    Ok(())
}
