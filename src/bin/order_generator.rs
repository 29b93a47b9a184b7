use orders_inbox::config::GeneratorConfig;
use orders_inbox::messaging::{random_order, OrderPublisher};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Publishes one random order right away, then one per interval, until Ctrl-C.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GeneratorConfig::from_env()?;
    let publisher = OrderPublisher::new(&config.brokers, &config.topic)?;

    tracing::info!(
        brokers = %config.brokers,
        topic = %config.topic,
        interval_secs = config.interval.as_secs(),
        "🚀 Order generator started"
    );

    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = interval.tick() => {}
        }

        let order = random_order(&mut rand::thread_rng());
        if let Err(e) = publisher.publish(&order).await {
            tracing::error!(order_uid = %order.order_uid, error = %e, "Failed to publish order");
        }
    }

    tracing::info!("👋 Order generator stopped");
    Ok(())
}
