// ============================================================================
// Application Layer
// ============================================================================
//
// - ports:          storage / cache traits the infrastructure implements
// - errors:         store, cache and service error taxonomy
// - orders_service: cache-aside reads and store-then-cache writes
//
// ============================================================================

mod errors;
mod orders_service;
mod ports;

pub use errors::{CacheError, ServiceError, StoreError};
pub use orders_service::OrdersService;
pub use ports::*;
