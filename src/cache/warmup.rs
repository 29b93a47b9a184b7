use crate::application::{CacheError, OrderCache, OrdersRepository, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum WarmUpError {
    #[error("failed to load recent orders: {0}")]
    Store(#[from] StoreError),

    #[error("failed to cache order: {0}")]
    Cache(#[from] CacheError),
}

/// Seed the cache with the `limit` most recently created orders.
/// Returns the number of orders cached. Any failure aborts the warm-up.
pub async fn warm_up(
    cache: &dyn OrderCache,
    orders: &dyn OrdersRepository,
    limit: i64,
) -> Result<usize, WarmUpError> {
    tracing::info!(limit, "🔥 Warming up order cache");

    let recent = orders.recent(limit).await?;
    for order in &recent {
        cache.cache(order).await?;
    }

    tracing::info!(cached = recent.len(), "✅ Cache warm-up complete");
    Ok(recent.len())
}
