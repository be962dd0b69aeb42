use std::sync::Arc;

use cabin_allocation::{
    allocation::{AllocationEngine, PerformanceMetrics, PgBookingStore},
    config::AppConfig,
    create_router, db,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Cabin Allocation API - Starting...");

    let config = AppConfig::from_env().expect("Invalid configuration");
    tracing::info!(
        "Pricing on channel '{}' in {}, tax factor {}, segment strategy {}",
        config.pricing.reference_channel,
        config.pricing.local_currency,
        config.pricing.tax_factor,
        config.segment_strategy
    );

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("Failed to create database pool");

    // Run SQLx migrations on startup
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations completed successfully");

    let metrics = PerformanceMetrics::new();
    let store = PgBookingStore::new(db_pool)
        .with_cache_ttl(config.cache_ttl)
        .with_metrics(metrics.clone());
    let engine =
        AllocationEngine::new(Arc::new(store), config.engine_settings()).with_metrics(metrics.clone());

    let app = create_router(Arc::new(engine));

    // Start the Axum server
    let addr = config.bind_address();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Cabin Allocation API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    metrics.log_summary();
    tracing::info!("Cabin Allocation API stopped");
}

/// Resolves on Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections");
}
