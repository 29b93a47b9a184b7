use std::sync::Arc;

use super::errors::ServiceError;
use super::ports::{CacheLookup, OrderCache, OrdersRepository};
use crate::domain::order::{parse_order_uid, Order};
use crate::metrics::Metrics;

// ============================================================================
// Orders Query Service
// ============================================================================
//
// Reads are cache-aside: cache first, store on a miss. A cache error is
// surfaced rather than silently falling through, so an outage never turns
// into a false "not found".
//
// Writes commit to the store first and only then populate the cache, so the
// cache never holds an order the store does not.
//
// ============================================================================

pub struct OrdersService {
    cache: Arc<dyn OrderCache>,
    orders: Arc<dyn OrdersRepository>,
    metrics: Arc<Metrics>,
    read_through: bool,
}

impl OrdersService {
    pub fn new(cache: Arc<dyn OrderCache>, orders: Arc<dyn OrdersRepository>, metrics: Arc<Metrics>) -> Self {
        Self {
            cache,
            orders,
            metrics,
            read_through: false,
        }
    }

    /// Populate the cache on a store-fallback hit.
    pub fn with_read_through(mut self, enabled: bool) -> Self {
        self.read_through = enabled;
        self
    }

    pub async fn get_order(&self, order_uid: &str) -> Result<Option<Order>, ServiceError> {
        let uid = parse_order_uid(order_uid)?;

        match self.cache.get_order_from_cache(&uid).await {
            CacheLookup::Hit(order) => {
                self.metrics.record_cache_lookup("hit");
                tracing::debug!(order_uid = %uid, "Order served from cache");
                return Ok(Some(order));
            }
            CacheLookup::Miss => {
                self.metrics.record_cache_lookup("miss");
            }
            CacheLookup::Failed(e) => {
                self.metrics.record_cache_lookup("error");
                tracing::error!(order_uid = %uid, error = %e, "Cache lookup failed");
                return Err(e.into());
            }
        }

        let order = self.orders.get(&uid).await?;

        match &order {
            Some(found) if self.read_through => {
                if let Err(e) = self.cache.cache(found).await {
                    tracing::warn!(order_uid = %uid, error = %e, "Read-through cache population failed");
                }
            }
            Some(_) => tracing::debug!(order_uid = %uid, "Order served from store"),
            None => tracing::debug!(order_uid = %uid, "Order not found"),
        }

        Ok(order)
    }

    pub async fn save_order(&self, order: &Order) -> Result<(), ServiceError> {
        order.validate()?;

        self.orders.store(order).await?;

        if let Err(e) = self.cache.cache(order).await {
            tracing::error!(
                order_uid = %order.order_uid,
                error = %e,
                "Order committed but cache population failed"
            );
            return Err(e.into());
        }

        tracing::info!(order_uid = %order.order_uid, "Order saved");
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
