use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::{CacheError, StoreError};
use crate::domain::order::Order;

// ============================================================================
// Ports - storage and cache seams
// ============================================================================
//
// PostgreSQL / Redis adapters implement these in production; the test-only
// in-memory adapters implement them for unit tests.
//
// ============================================================================

/// Final state recorded on a staged message when it is marked processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Applied,
    Duplicate,
    Quarantined,
    DeadLettered,
}

impl ProcessingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingOutcome::Applied => "applied",
            ProcessingOutcome::Duplicate => "duplicate",
            ProcessingOutcome::Quarantined => "quarantined",
            ProcessingOutcome::DeadLettered => "dead_lettered",
        }
    }
}

/// A raw bus record as held by the inbox. The payload is kept byte for byte;
/// decoding happens in the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedMessage {
    pub key: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub processed: bool,
    pub attempts: i32,
    /// Token of the lease this copy was read under, if any.
    pub lease_token: Option<Uuid>,
}

#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Stage a message. Returns `false` when the key was already staged.
    async fn append(&self, key: &str, topic: &str, payload: &[u8]) -> Result<bool, StoreError>;

    /// Oldest-first unprocessed messages, ignoring leases.
    async fn fetch_unprocessed(&self, limit: i64) -> Result<Vec<StagedMessage>, StoreError>;

    /// Oldest-first unprocessed messages not under a live lease, leased to
    /// the caller for `lease`.
    async fn claim_unprocessed(&self, limit: i64, lease: Duration) -> Result<Vec<StagedMessage>, StoreError>;

    /// Flip the message to processed with `outcome`, provided it is still
    /// unprocessed and still held under `message.lease_token`. Returns `false`
    /// when the lease was lost and nothing was written.
    async fn mark_processed(&self, message: &StagedMessage, outcome: ProcessingOutcome) -> Result<bool, StoreError>;

    /// Bump the attempt counter, keep the error and release the lease, under
    /// the same lease check as `mark_processed`. Returns the new attempt
    /// count, or `None` when the lease was lost.
    async fn record_failure(&self, message: &StagedMessage, error: &str) -> Result<Option<i32>, StoreError>;
}

#[async_trait]
pub trait OrdersRepository: Send + Sync {
    async fn get(&self, order_uid: &Uuid) -> Result<Option<Order>, StoreError>;

    /// All-or-nothing insert of the whole aggregate.
    async fn store(&self, order: &Order) -> Result<(), StoreError>;

    /// The `limit` most recently created orders, newest first.
    async fn recent(&self, limit: i64) -> Result<Vec<Order>, StoreError>;
}

/// Outcome of a cache read. A miss is not an error.
#[derive(Debug)]
pub enum CacheLookup {
    Hit(Order),
    Miss,
    Failed(CacheError),
}

#[async_trait]
pub trait OrderCache: Send + Sync {
    async fn cache(&self, order: &Order) -> Result<(), CacheError>;

    async fn get_order_from_cache(&self, order_uid: &Uuid) -> CacheLookup;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// Payload could not be decoded into a valid Order.
    Undecodable,
    /// The store permanently rejected the aggregate.
    Rejected,
    /// Transient store failures outlasted the attempt budget.
    RetriesExhausted,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::Undecodable => "undecodable",
            DeadLetterReason::Rejected => "rejected",
            DeadLetterReason::RetriesExhausted => "retries_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub id: Uuid,
    pub message_id: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub reason: DeadLetterReason,
    pub error_message: String,
    pub failure_count: i32,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn insert(&self, letter: &DeadLetter) -> Result<(), StoreError>;
}
