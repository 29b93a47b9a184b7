use chrono::Utc;
use kameo::Actor;
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use std::sync::Arc;
use uuid::Uuid;

use crate::application::{DeadLetter, DeadLetterReason, DeadLetterStore, StoreError};
use crate::metrics::Metrics;

// ============================================================================
// Dead Letter Queue Actor
// ============================================================================
//
// Records every staged message that was dropped without being applied:
// - undecodable payloads (quarantined)
// - aggregates the store permanently rejected
// - messages whose transient failures outlasted the attempt budget
//
// Rows land in `dead_letter_queue` for manual inspection and replay.
//
// ============================================================================

pub struct DlqActor {
    store: Arc<dyn DeadLetterStore>,
    metrics: Arc<Metrics>,
}

impl DlqActor {
    pub fn new(store: Arc<dyn DeadLetterStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }
}

impl Actor for DlqActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!("DlqActor started - Dead Letter Queue ready");
        Ok(state)
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone)]
pub struct AddToDlq {
    pub message_id: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub reason: DeadLetterReason,
    pub error_message: String,
    pub failure_count: i32,
}

// ============================================================================
// Handlers
// ============================================================================

impl Message<AddToDlq> for DlqActor {
    type Reply = Result<(), StoreError>;

    async fn handle(&mut self, msg: AddToDlq, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        tracing::error!(
            message_id = %msg.message_id,
            reason = msg.reason.as_str(),
            error = %msg.error_message,
            failure_count = msg.failure_count,
            "💀 Adding message to Dead Letter Queue"
        );

        let letter = DeadLetter {
            id: Uuid::new_v4(),
            message_id: msg.message_id,
            topic: msg.topic,
            payload: msg.payload,
            reason: msg.reason,
            error_message: msg.error_message,
            failure_count: msg.failure_count,
            created_at: Utc::now(),
        };

        self.store.insert(&letter).await?;
        self.metrics.record_dlq_message(letter.reason.as_str());

        tracing::info!(
            dlq_id = %letter.id,
            message_id = %letter.message_id,
            "Message successfully stored in DLQ"
        );

        Ok(())
    }
}
