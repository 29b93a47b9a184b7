use uuid::Uuid;

use crate::domain::order::ValidationError;
use crate::utils::{CircuitBreakerError, IsTransient};

// ============================================================================
// Storage, Cache & Service Errors
// ============================================================================
//
// Not-found is never an error here: lookups return `Ok(None)` or
// `CacheLookup::Miss`.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("order {0} already exists")]
    DuplicateOrder(Uuid),

    #[error("order {order_uid} has no {relation} row")]
    MissingRelation {
        order_uid: Uuid,
        relation: &'static str,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::DuplicateOrder(_) | StoreError::MissingRelation { .. } => false,
            StoreError::Database(err) => match err {
                sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::Protocol(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => true,
                // serialization_failure, deadlock_detected, too_many_connections,
                // admin_shutdown, cannot_connect_now
                sqlx::Error::Database(db) => matches!(
                    db.code().as_deref(),
                    Some("40001" | "40P01" | "53300" | "57P01" | "57P03")
                ),
                _ => false,
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt cache snapshot: {0}")]
    Corrupt(String),

    #[error("cache unavailable: circuit breaker open")]
    Unavailable,
}

impl From<CircuitBreakerError<redis::RedisError>> for CacheError {
    fn from(err: CircuitBreakerError<redis::RedisError>) -> Self {
        match err {
            CircuitBreakerError::CircuitOpen => CacheError::Unavailable,
            CircuitBreakerError::OperationFailed(e) => CacheError::Redis(e),
        }
    }
}

/// Errors surfaced to callers of the query service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ServiceError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ServiceError::Validation(_))
    }
}
