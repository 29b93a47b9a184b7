// ============================================================================
// Cache Module
// ============================================================================
//
// Redis-backed, non-authoritative copy of recently seen orders plus the
// startup warm-up that seeds it from the store.
//
// ============================================================================

mod redis_cache;
mod warmup;

pub use redis_cache::RedisOrderCache;
pub use warmup::{warm_up, WarmUpError};
