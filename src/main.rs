use actix_web::web;
use kameo::prelude::*;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orders_inbox::actors::{DlqActor, HealthMonitorActor};
use orders_inbox::application::{InboxStore, OrdersRepository, OrdersService};
use orders_inbox::cache::{self, RedisOrderCache};
use orders_inbox::config::Config;
use orders_inbox::db::{self, PgDeadLetters, PgInbox, PgOrdersRepository};
use orders_inbox::messaging::{InboxConsumer, Stager};
use orders_inbox::processing::BatchProcessor;
use orders_inbox::{http, metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,orders_inbox=debug")))
        .init();

    tracing::info!("🚀 Starting order inbox service");

    let config = Config::from_env()?;

    // === 1. PostgreSQL pool and schema ===
    tracing::info!("Connecting to PostgreSQL...");
    let pool = db::connect(&config.database_url, config.database_max_connections).await?;
    db::ensure_schema(&pool).await?;

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Stores ===
    let inbox: Arc<dyn InboxStore> = Arc::new(PgInbox::new(pool.clone()));
    let orders: Arc<dyn OrdersRepository> = Arc::new(PgOrdersRepository::new(pool.clone()));
    let dead_letters = Arc::new(PgDeadLetters::new(pool.clone()));

    // === 4. Redis cache, warmed before anything is served ===
    let order_cache = Arc::new(RedisOrderCache::connect(&config.redis_url, config.cache_ttl).await?);
    let warmed = cache::warm_up(order_cache.as_ref(), orders.as_ref(), config.cache_warmup_limit).await?;
    tracing::info!(warmed, "Cache ready");

    // === 5. Infrastructure actors ===
    let health_monitor =
        HealthMonitorActor::spawn(HealthMonitorActor::new().with_cache_breaker(order_cache.circuit_breaker()));
    let dlq_actor = DlqActor::spawn(DlqActor::new(dead_letters, metrics.clone()));

    let service = Arc::new(
        OrdersService::new(order_cache.clone(), orders.clone(), metrics.clone())
            .with_read_through(config.cache_read_through),
    );

    // === 6. Background loops ===
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let processor = BatchProcessor::new(inbox.clone(), orders.clone(), metrics.clone(), config.processor.clone())
        .with_dead_letters(dlq_actor.clone())
        .with_health_monitor(health_monitor.clone());
    let processor_task = tokio::spawn(processor.run(shutdown_rx.clone()));

    let consumer = InboxConsumer::new(&config.kafka, Stager::new(inbox.clone(), metrics.clone()))?
        .with_health_monitor(health_monitor.clone());
    let consumer_task = tokio::spawn(consumer.run(shutdown_rx));

    // === 7. HTTP ===
    let state = web::Data::new(http::AppState {
        orders: service,
        metrics: metrics.clone(),
        health_monitor: Some(health_monitor.clone()),
    });
    let server = http::start_http_server(state, config.http_port)?;
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tracing::info!("✅ Order inbox service running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    // === Shutdown: stop intake first, let in-flight work finish ===
    tracing::info!("🛑 Shutdown signal received");
    let _ = shutdown_tx.send(true);
    server_handle.stop(true).await;

    if let Err(e) = consumer_task.await {
        tracing::error!(error = %e, "Consumer task failed");
    }
    if let Err(e) = processor_task.await {
        tracing::error!(error = %e, "Processor task failed");
    }
    match server_task.await {
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server error"),
        Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
        Ok(Ok(())) => {}
    }

    let _ = dlq_actor.stop_gracefully().await;
    let _ = health_monitor.stop_gracefully().await;
    pool.close().await;

    tracing::info!("👋 Shutdown complete");
    Ok(())
}
