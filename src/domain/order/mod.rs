// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (Order aggregate, Delivery, Payment, Item)
// - Wire codec (decode/encode of the bus event shape)
// - Errors (validation and decode failures)
//
// ============================================================================

pub mod codec;
pub mod errors;
pub mod value_objects;

pub use codec::*;
pub use errors::*;
pub use value_objects::*;
