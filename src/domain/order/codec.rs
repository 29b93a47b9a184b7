use super::errors::DecodeError;
use super::value_objects::Order;

// ============================================================================
// Wire Codec
// ============================================================================
//
// Inbound events, cache snapshots and HTTP responses share one JSON shape:
// UUID strings for `order_uid` / `payment.transaction`, RFC3339 for
// `date_created` and unix seconds for `payment.payment_dt`.
//
// ============================================================================

/// Decode and validate an inbound order event.
pub fn decode_order(payload: &[u8]) -> Result<Order, DecodeError> {
    let order: Order = serde_json::from_slice(payload)?;
    order.validate()?;
    Ok(order)
}

pub fn encode_order(order: &Order) -> Result<String, serde_json::Error> {
    serde_json::to_string(order)
}
