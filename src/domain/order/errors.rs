// ============================================================================
// Order Validation & Decode Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("order_uid is empty")]
    EmptyOrderUid,

    #[error("order_uid is not a valid UUID: {0:?}")]
    InvalidOrderUid(String),

    #[error("payment transaction is empty")]
    EmptyTransaction,

    #[error("{field} must be non-negative, got {value}")]
    NegativeAmount { field: &'static str, value: i64 },
}

/// Why an inbound payload could not become an Order.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed order payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid order: {0}")]
    Invalid(#[from] ValidationError),
}
