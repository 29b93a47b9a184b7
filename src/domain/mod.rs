// ============================================================================
// Domain Layer
// ============================================================================
//
// The order aggregate: value objects, invariants and the wire codec.
// Nothing here touches storage, the cache or the bus.
//
// ============================================================================

pub mod order;
