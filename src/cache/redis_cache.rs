use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::application::{CacheError, CacheLookup, OrderCache};
use crate::domain::order::{decode_order, encode_order, Order};
use crate::utils::{CircuitBreaker, CircuitBreakerConfig};

// ============================================================================
// Redis Order Cache
// ============================================================================
//
// Snapshots are the order's wire JSON stored under `order:{uid}` with a TTL.
// Every round-trip goes through the circuit breaker; while it is open calls
// fail fast with `CacheError::Unavailable`.
//
// ============================================================================

fn cache_key(order_uid: &Uuid) -> String {
    format!("order:{order_uid}")
}

pub struct RedisOrderCache {
    conn: MultiplexedConnection,
    ttl: Duration,
    circuit_breaker: CircuitBreaker,
}

impl RedisOrderCache {
    /// Open a multiplexed connection and verify it with `PING`.
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        tracing::info!(url = %url, reply = %pong, "✅ Connected to Redis");

        Ok(Self {
            conn,
            ttl,
            circuit_breaker: CircuitBreaker::new("redis", CircuitBreakerConfig::default()),
        })
    }

    pub fn circuit_breaker(&self) -> CircuitBreaker {
        self.circuit_breaker.clone()
    }
}

#[async_trait]
impl OrderCache for RedisOrderCache {
    async fn cache(&self, order: &Order) -> Result<(), CacheError> {
        let snapshot = encode_order(order)?;
        let key = cache_key(&order.order_uid);
        let mut conn = self.conn.clone();
        let ttl_secs = self.ttl.as_secs().max(1);

        self.circuit_breaker
            .call(async move { conn.set_ex::<_, _, ()>(key, snapshot, ttl_secs).await })
            .await?;

        tracing::debug!(order_uid = %order.order_uid, ttl_secs, "Order cached");
        Ok(())
    }

    async fn get_order_from_cache(&self, order_uid: &Uuid) -> CacheLookup {
        let key = cache_key(order_uid);
        let mut conn = self.conn.clone();

        let snapshot = match self
            .circuit_breaker
            .call(async move { conn.get::<_, Option<String>>(key).await })
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => return CacheLookup::Failed(e.into()),
        };

        match snapshot {
            None => CacheLookup::Miss,
            Some(json) => match decode_order(json.as_bytes()) {
                Ok(order) => CacheLookup::Hit(order),
                Err(e) => {
                    tracing::warn!(order_uid = %order_uid, error = %e, "Corrupt cache snapshot");
                    CacheLookup::Failed(CacheError::Corrupt(e.to_string()))
                }
            },
        }
    }
}
