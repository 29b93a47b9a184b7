// ============================================================================
// Messaging Module
// ============================================================================
//
// Kafka intake: receives raw order events and stages them in the inbox.
// Also a producer of random orders for development (order_generator).
//
// ============================================================================

mod consumer;
mod generator;

pub use consumer::{message_identity, InboxConsumer, Stager};
pub use generator::{random_order, OrderPublisher, PublishError};
