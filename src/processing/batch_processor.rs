use std::sync::Arc;
use std::time::{Duration, Instant};

use kameo::actor::ActorRef;
use kameo::error::SendError;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::actors::{AddToDlq, DlqActor, HealthMonitorActor, HealthStatus, UpdateHealth};
use crate::application::{
    DeadLetterReason, InboxStore, OrdersRepository, ProcessingOutcome, StagedMessage, StoreError,
};
use crate::domain::order::{decode_order, DecodeError};
use crate::metrics::Metrics;
use crate::utils::IsTransient;

// ============================================================================
// Inbox Batch Processor
// ============================================================================
//
// Every poll interval a bounded batch of unprocessed inbox messages is
// claimed (or simply fetched when leasing is off) and applied one by one:
//
//   decode ──✗──► quarantined   (dead letter: undecodable)
//     │
//   store ──✓──► applied
//     ├── uid exists ─────► applied when the stored aggregate is this order
//     │                     (an earlier commit whose mark was lost),
//     │                     duplicate otherwise
//     ├── permanent ──────► dead_lettered (dead letter: rejected)
//     └── transient ──────► attempts += 1, retried next cycle,
//                           dead_lettered after max_attempts
//                           (dead letter: retries_exhausted)
//
// Every inbox write is conditional on still holding the lease the message
// was claimed under. A lost lease means another processor owns the message
// now, so this one records nothing and moves on (lease_lost).
//
// A failing message never blocks the rest of the batch. Only an inbox or
// DLQ failure aborts the cycle; the next tick picks the work up again.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub max_attempts: i32,
    /// Zero disables leasing (single-instance mode).
    pub lease: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(2),
            max_attempts: 5,
            lease: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    Applied,
    Duplicate,
    Quarantined,
    DeadLettered,
    RetryLater,
    LeaseLost,
}

impl MessageDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageDisposition::Applied => "applied",
            MessageDisposition::Duplicate => "duplicate",
            MessageDisposition::Quarantined => "quarantined",
            MessageDisposition::DeadLettered => "dead_lettered",
            MessageDisposition::RetryLater => "retry_later",
            MessageDisposition::LeaseLost => "lease_lost",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub fetched: usize,
    pub applied: usize,
    pub duplicates: usize,
    pub quarantined: usize,
    pub dead_lettered: usize,
    pub retry_later: usize,
    pub lease_lost: usize,
}

impl BatchReport {
    fn record(&mut self, disposition: MessageDisposition) {
        match disposition {
            MessageDisposition::Applied => self.applied += 1,
            MessageDisposition::Duplicate => self.duplicates += 1,
            MessageDisposition::Quarantined => self.quarantined += 1,
            MessageDisposition::DeadLettered => self.dead_lettered += 1,
            MessageDisposition::RetryLater => self.retry_later += 1,
            MessageDisposition::LeaseLost => self.lease_lost += 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("inbox error: {0}")]
    Inbox(#[from] StoreError),

    #[error("dead letter queue error: {0}")]
    DeadLetter(String),
}

pub struct BatchProcessor {
    inbox: Arc<dyn InboxStore>,
    orders: Arc<dyn OrdersRepository>,
    metrics: Arc<Metrics>,
    config: ProcessorConfig,
    dlq_actor: Option<ActorRef<DlqActor>>,
    health_monitor: Option<ActorRef<HealthMonitorActor>>,
}

impl BatchProcessor {
    pub fn new(
        inbox: Arc<dyn InboxStore>,
        orders: Arc<dyn OrdersRepository>,
        metrics: Arc<Metrics>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            inbox,
            orders,
            metrics,
            config,
            dlq_actor: None,
            health_monitor: None,
        }
    }

    pub fn with_dead_letters(mut self, dlq_actor: ActorRef<DlqActor>) -> Self {
        self.dlq_actor = Some(dlq_actor);
        self
    }

    pub fn with_health_monitor(mut self, health_monitor: ActorRef<HealthMonitorActor>) -> Self {
        self.health_monitor = Some(health_monitor);
        self
    }

    /// Poll until the shutdown flag flips. A batch in flight always completes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            lease_secs = self.config.lease.as_secs(),
            "🔄 Inbox processor started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            match self.process_batch().await {
                Ok(report) => {
                    if report.fetched > 0 {
                        tracing::info!(?report, "📬 Inbox batch processed");
                    }
                    self.report_health(HealthStatus::Healthy).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Inbox batch aborted, retrying next cycle");
                    self.report_health(HealthStatus::Degraded(e.to_string())).await;
                }
            }
        }

        tracing::info!("🛑 Inbox processor stopped");
    }

    pub async fn process_batch(&self) -> Result<BatchReport, BatchError> {
        let started = Instant::now();

        let messages = if self.config.lease.is_zero() {
            self.inbox.fetch_unprocessed(self.config.batch_size).await?
        } else {
            self.inbox
                .claim_unprocessed(self.config.batch_size, self.config.lease)
                .await?
        };

        let mut report = BatchReport {
            fetched: messages.len(),
            ..BatchReport::default()
        };

        for message in &messages {
            let disposition = self.process_message(message).await?;
            self.metrics.record_processed(disposition.as_str());
            report.record(disposition);
        }

        self.metrics.observe_batch(started.elapsed());
        Ok(report)
    }

    async fn process_message(&self, message: &StagedMessage) -> Result<MessageDisposition, BatchError> {
        let order = match decode_order(&message.payload) {
            Ok(order) => order,
            Err(e) => {
                let reason = match &e {
                    DecodeError::Malformed(_) => "malformed",
                    DecodeError::Invalid(_) => "invalid",
                };
                tracing::warn!(
                    message_id = %message.key,
                    reason,
                    error = %e,
                    "☣️  Quarantining undecodable message"
                );
                self.metrics.record_quarantine(reason);
                self.dead_letter(message, DeadLetterReason::Undecodable, e.to_string(), message.attempts + 1)
                    .await?;
                return self
                    .finish(message, ProcessingOutcome::Quarantined, MessageDisposition::Quarantined)
                    .await;
            }
        };

        let stored = match self.orders.store(&order).await {
            Err(StoreError::DuplicateOrder(order_uid)) => match self.orders.get(&order_uid).await {
                Ok(Some(existing)) if existing == order => {
                    tracing::info!(
                        message_id = %message.key,
                        order_uid = %order_uid,
                        "Order already stored with identical content, treating as applied"
                    );
                    Ok(())
                }
                Ok(_) => Err(StoreError::DuplicateOrder(order_uid)),
                Err(e) => Err(e),
            },
            other => other,
        };

        match stored {
            Ok(()) => {
                tracing::debug!(message_id = %message.key, order_uid = %order.order_uid, "Order applied");
                self.finish(message, ProcessingOutcome::Applied, MessageDisposition::Applied)
                    .await
            }
            Err(StoreError::DuplicateOrder(order_uid)) => {
                tracing::warn!(
                    message_id = %message.key,
                    order_uid = %order_uid,
                    "Order already exists, skipping replayed message"
                );
                self.finish(message, ProcessingOutcome::Duplicate, MessageDisposition::Duplicate)
                    .await
            }
            Err(e) if e.is_transient() => {
                let Some(attempts) = self.inbox.record_failure(message, &e.to_string()).await? else {
                    return Ok(MessageDisposition::LeaseLost);
                };

                if attempts < self.config.max_attempts {
                    tracing::warn!(
                        message_id = %message.key,
                        attempts,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "Transient store failure, will retry"
                    );
                    return Ok(MessageDisposition::RetryLater);
                }

                tracing::error!(
                    message_id = %message.key,
                    attempts,
                    error = %e,
                    "❌ Retries exhausted, dead-lettering message"
                );
                self.dead_letter(message, DeadLetterReason::RetriesExhausted, e.to_string(), attempts)
                    .await?;
                // record_failure released the lease; the row is now unleased.
                let released = StagedMessage {
                    lease_token: None,
                    ..message.clone()
                };
                self.finish(&released, ProcessingOutcome::DeadLettered, MessageDisposition::DeadLettered)
                    .await
            }
            Err(e) => {
                tracing::error!(
                    message_id = %message.key,
                    order_uid = %order.order_uid,
                    error = %e,
                    "❌ Store rejected order, dead-lettering message"
                );
                self.dead_letter(message, DeadLetterReason::Rejected, e.to_string(), message.attempts + 1)
                    .await?;
                self.finish(message, ProcessingOutcome::DeadLettered, MessageDisposition::DeadLettered)
                    .await
            }
        }
    }

    /// Record `outcome` on the inbox row, or report the lease as lost.
    async fn finish(
        &self,
        message: &StagedMessage,
        outcome: ProcessingOutcome,
        disposition: MessageDisposition,
    ) -> Result<MessageDisposition, BatchError> {
        if self.inbox.mark_processed(message, outcome).await? {
            Ok(disposition)
        } else {
            Ok(MessageDisposition::LeaseLost)
        }
    }

    async fn dead_letter(
        &self,
        message: &StagedMessage,
        reason: DeadLetterReason,
        error_message: String,
        failure_count: i32,
    ) -> Result<(), BatchError> {
        let Some(dlq) = &self.dlq_actor else {
            tracing::error!(
                message_id = %message.key,
                reason = reason.as_str(),
                error = %error_message,
                "No DLQ configured, dropped message is only logged"
            );
            return Ok(());
        };

        let msg = AddToDlq {
            message_id: message.key.clone(),
            topic: message.topic.clone(),
            payload: message.payload.clone(),
            reason,
            error_message,
            failure_count,
        };

        match dlq.ask(msg).await {
            Ok(()) => Ok(()),
            Err(SendError::HandlerError(e)) => Err(BatchError::DeadLetter(e.to_string())),
            Err(e) => Err(BatchError::DeadLetter(format!("{e:?}"))),
        }
    }

    async fn report_health(&self, status: HealthStatus) {
        if let Some(ref health_monitor) = self.health_monitor {
            // Fire and forget - use tell
            let _ = health_monitor
                .tell(UpdateHealth {
                    component: "processor".to_string(),
                    status,
                    details: None,
                })
                .send()
                .await;
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{OrdersService, ServiceError};
    use crate::testing::{sample_payload, InMemoryCache, InMemoryDeadLetters, InMemoryInbox, InMemoryOrders};
    use kameo::prelude::*;

    const UID: &str = "11111111-1111-1111-1111-111111111111";

    struct Harness {
        inbox: Arc<InMemoryInbox>,
        orders: Arc<InMemoryOrders>,
        letters: Arc<InMemoryDeadLetters>,
        metrics: Arc<Metrics>,
        processor: BatchProcessor,
    }

    fn harness(config: ProcessorConfig) -> Harness {
        let inbox = Arc::new(InMemoryInbox::default());
        let orders = Arc::new(InMemoryOrders::default());
        let letters = Arc::new(InMemoryDeadLetters::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let dlq = DlqActor::spawn(DlqActor::new(letters.clone(), metrics.clone()));
        let processor =
            BatchProcessor::new(inbox.clone(), orders.clone(), metrics.clone(), config).with_dead_letters(dlq);

        Harness {
            inbox,
            orders,
            letters,
            metrics,
            processor,
        }
    }

    fn transient() -> StoreError {
        StoreError::Database(sqlx::Error::PoolTimedOut)
    }

    fn permanent() -> StoreError {
        StoreError::Database(sqlx::Error::ColumnNotFound("sm_id".into()))
    }

    #[tokio::test]
    async fn test_staged_order_becomes_queryable() {
        let h = harness(ProcessorConfig::default());
        h.inbox.append("msg-1", "order_created", sample_payload(UID, 500).as_bytes()).await.unwrap();

        let report = h.processor.process_batch().await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(h.inbox.outcome("msg-1"), Some(ProcessingOutcome::Applied));

        let service = OrdersService::new(Arc::new(InMemoryCache::default()), h.orders.clone(), h.metrics.clone());
        let order = service.get_order(UID).await.unwrap().unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].total_price, 500);
    }

    #[tokio::test]
    async fn test_redelivery_with_same_key_is_a_noop() {
        let h = harness(ProcessorConfig::default());
        let payload = sample_payload(UID, 500);
        assert!(h.inbox.append("msg-1", "order_created", payload.as_bytes()).await.unwrap());
        h.processor.process_batch().await.unwrap();

        assert!(!h.inbox.append("msg-1", "order_created", payload.as_bytes()).await.unwrap());
        let report = h.processor.process_batch().await.unwrap();

        assert_eq!(report.fetched, 0);
        assert_eq!(h.inbox.len(), 1);
        assert_eq!(h.orders.len(), 1);
    }

    #[tokio::test]
    async fn test_replay_under_new_key_is_duplicate() {
        let h = harness(ProcessorConfig::default());
        h.inbox.append("msg-1", "order_created", sample_payload(UID, 500).as_bytes()).await.unwrap();
        h.inbox.append("msg-2", "order_created", sample_payload(UID, 700).as_bytes()).await.unwrap();

        let report = h.processor.process_batch().await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(h.inbox.outcome("msg-2"), Some(ProcessingOutcome::Duplicate));
        let order = h.orders.get(&UID.parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].total_price, 500);
        assert!(h.letters.letters().is_empty());
    }

    #[tokio::test]
    async fn test_identical_replay_under_new_key_adds_no_rows() {
        let h = harness(ProcessorConfig::default());
        let payload = sample_payload(UID, 500);
        h.inbox.append("msg-1", "order_created", payload.as_bytes()).await.unwrap();
        h.inbox.append("msg-2", "order_created", payload.as_bytes()).await.unwrap();

        let report = h.processor.process_batch().await.unwrap();

        assert_eq!(report.applied, 2);
        assert_eq!(h.orders.len(), 1);
        let order = h.orders.get(&UID.parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(order.items.len(), 1);
    }

    #[tokio::test]
    async fn test_committed_order_with_unrecorded_outcome_is_applied() {
        let h = harness(ProcessorConfig::default());
        let payload = sample_payload(UID, 500);
        // The order committed on an earlier cycle, but its outcome never made
        // it to the inbox.
        h.orders.store(&decode_order(payload.as_bytes()).unwrap()).await.unwrap();
        h.inbox.append("msg-1", "order_created", payload.as_bytes()).await.unwrap();

        let report = h.processor.process_batch().await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.duplicates, 0);
        assert_eq!(h.inbox.outcome("msg-1"), Some(ProcessingOutcome::Applied));
    }

    #[tokio::test]
    async fn test_lookup_failure_on_duplicate_is_retried() {
        let h = harness(ProcessorConfig::default());
        let payload = sample_payload(UID, 500);
        h.orders.store(&decode_order(payload.as_bytes()).unwrap()).await.unwrap();
        h.inbox.append("msg-1", "order_created", payload.as_bytes()).await.unwrap();
        h.orders.set_unavailable(true);

        let report = h.processor.process_batch().await.unwrap();

        assert_eq!(report.retry_later, 1);
        assert_eq!(h.inbox.outcome("msg-1"), None);

        h.orders.set_unavailable(false);
        assert_eq!(h.processor.process_batch().await.unwrap().applied, 1);
    }

    /// Delegates to the in-memory inbox, but every claimed lease is taken
    /// over by another holder before the processor gets to write.
    struct StolenLeases(Arc<InMemoryInbox>);

    #[async_trait::async_trait]
    impl InboxStore for StolenLeases {
        async fn append(&self, key: &str, topic: &str, payload: &[u8]) -> Result<bool, StoreError> {
            self.0.append(key, topic, payload).await
        }

        async fn fetch_unprocessed(&self, limit: i64) -> Result<Vec<StagedMessage>, StoreError> {
            self.0.fetch_unprocessed(limit).await
        }

        async fn claim_unprocessed(&self, limit: i64, lease: Duration) -> Result<Vec<StagedMessage>, StoreError> {
            let claimed = self.0.claim_unprocessed(limit, lease).await?;
            self.0.steal_leases();
            Ok(claimed)
        }

        async fn mark_processed(
            &self,
            message: &StagedMessage,
            outcome: ProcessingOutcome,
        ) -> Result<bool, StoreError> {
            self.0.mark_processed(message, outcome).await
        }

        async fn record_failure(&self, message: &StagedMessage, error: &str) -> Result<Option<i32>, StoreError> {
            self.0.record_failure(message, error).await
        }
    }

    #[tokio::test]
    async fn test_lost_lease_records_nothing_and_next_holder_applies() {
        let config = ProcessorConfig {
            lease: Duration::from_millis(1),
            ..ProcessorConfig::default()
        };
        let h = harness(config.clone());
        h.inbox.append("msg-1", "order_created", sample_payload(UID, 500).as_bytes()).await.unwrap();
        let stale = BatchProcessor::new(
            Arc::new(StolenLeases(h.inbox.clone())),
            h.orders.clone(),
            h.metrics.clone(),
            config,
        );

        let report = stale.process_batch().await.unwrap();

        assert_eq!(report.lease_lost, 1);
        assert_eq!(h.inbox.outcome("msg-1"), None);
        assert_eq!(h.orders.len(), 1);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let report = h.processor.process_batch().await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(h.inbox.outcome("msg-1"), Some(ProcessingOutcome::Applied));
    }

    #[tokio::test]
    async fn test_lost_lease_on_transient_failure_keeps_attempts() {
        let config = ProcessorConfig {
            lease: Duration::from_millis(1),
            ..ProcessorConfig::default()
        };
        let h = harness(config.clone());
        h.inbox.append("msg-1", "order_created", sample_payload(UID, 500).as_bytes()).await.unwrap();
        h.orders.fail_next_store(transient);
        let stale = BatchProcessor::new(
            Arc::new(StolenLeases(h.inbox.clone())),
            h.orders.clone(),
            h.metrics.clone(),
            config,
        );

        let report = stale.process_batch().await.unwrap();

        assert_eq!(report.lease_lost, 1);
        assert_eq!(h.inbox.attempts("msg-1"), 0);
        assert_eq!(h.inbox.last_error("msg-1"), None);
    }

    #[tokio::test]
    async fn test_undecodable_message_is_quarantined_without_blocking_batch() {
        let h = harness(ProcessorConfig::default());
        h.inbox.append("bad", "order_created", b"{not json").await.unwrap();
        h.inbox.append("good", "order_created", sample_payload(UID, 500).as_bytes()).await.unwrap();

        let report = h.processor.process_batch().await.unwrap();

        assert_eq!(report.quarantined, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(h.inbox.outcome("bad"), Some(ProcessingOutcome::Quarantined));

        let letters = h.letters.letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].message_id, "bad");
        assert_eq!(letters[0].reason, DeadLetterReason::Undecodable);
        assert_eq!(h.metrics.messages_quarantined.with_label_values(&["malformed"]).get(), 1);
    }

    #[tokio::test]
    async fn test_non_utf8_payload_is_quarantined_verbatim() {
        let h = harness(ProcessorConfig::default());
        let mut payload = sample_payload(UID, 500).into_bytes();
        // Corrupt a byte inside a string field; a lossy conversion would
        // still decode this into an order with a mangled name.
        let at = payload.windows(8).position(|w| w == b"Mascaras").unwrap();
        payload[at] = 0xff;
        h.inbox.append("corrupt", "order_created", &payload).await.unwrap();

        let report = h.processor.process_batch().await.unwrap();

        assert_eq!(report.quarantined, 1);
        assert_eq!(h.orders.len(), 0);
        assert_eq!(h.inbox.outcome("corrupt"), Some(ProcessingOutcome::Quarantined));
        let letters = h.letters.letters();
        assert_eq!(letters[0].reason, DeadLetterReason::Undecodable);
        assert_eq!(letters[0].payload, payload);
    }

    #[tokio::test]
    async fn test_invalid_order_is_quarantined() {
        let h = harness(ProcessorConfig::default());
        h.inbox
            .append("nil", "order_created", sample_payload("00000000-0000-0000-0000-000000000000", 500).as_bytes())
            .await
            .unwrap();

        let report = h.processor.process_batch().await.unwrap();

        assert_eq!(report.quarantined, 1);
        assert_eq!(h.metrics.messages_quarantined.with_label_values(&["invalid"]).get(), 1);
        assert_eq!(h.orders.len(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_then_applied() {
        let h = harness(ProcessorConfig::default());
        h.inbox.append("msg-1", "order_created", sample_payload(UID, 500).as_bytes()).await.unwrap();
        h.orders.fail_next_store(transient);

        let first = h.processor.process_batch().await.unwrap();
        assert_eq!(first.retry_later, 1);
        assert_eq!(h.inbox.attempts("msg-1"), 1);
        assert!(h.inbox.last_error("msg-1").is_some());
        assert_eq!(h.inbox.outcome("msg-1"), None);

        let second = h.processor.process_batch().await.unwrap();
        assert_eq!(second.applied, 1);
        assert_eq!(h.inbox.outcome("msg-1"), Some(ProcessingOutcome::Applied));
    }

    #[tokio::test]
    async fn test_transient_failures_dead_letter_after_max_attempts() {
        let h = harness(ProcessorConfig {
            max_attempts: 3,
            ..ProcessorConfig::default()
        });
        h.inbox.append("msg-1", "order_created", sample_payload(UID, 500).as_bytes()).await.unwrap();
        h.orders.fail_stores(Some(transient));

        for _ in 0..2 {
            let report = h.processor.process_batch().await.unwrap();
            assert_eq!(report.retry_later, 1);
        }
        let last = h.processor.process_batch().await.unwrap();

        assert_eq!(last.dead_lettered, 1);
        assert_eq!(h.inbox.outcome("msg-1"), Some(ProcessingOutcome::DeadLettered));
        let letters = h.letters.letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].reason, DeadLetterReason::RetriesExhausted);
        assert_eq!(letters[0].failure_count, 3);

        assert_eq!(h.processor.process_batch().await.unwrap().fetched, 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_dead_lettered_immediately() {
        let h = harness(ProcessorConfig::default());
        h.inbox.append("msg-1", "order_created", sample_payload(UID, 500).as_bytes()).await.unwrap();
        h.orders.fail_next_store(permanent);

        let report = h.processor.process_batch().await.unwrap();

        assert_eq!(report.dead_lettered, 1);
        assert_eq!(h.inbox.attempts("msg-1"), 0);
        assert_eq!(h.letters.letters()[0].reason, DeadLetterReason::Rejected);
        assert_eq!(h.metrics.dlq_messages_by_reason.with_label_values(&["rejected"]).get(), 1);
    }

    #[tokio::test]
    async fn test_inbox_outage_aborts_cycle() {
        let h = harness(ProcessorConfig::default());
        h.inbox.set_unavailable(true);

        let err = h.processor.process_batch().await.unwrap_err();

        assert!(matches!(err, BatchError::Inbox(_)));
    }

    #[tokio::test]
    async fn test_dlq_failure_leaves_message_unprocessed() {
        let h = harness(ProcessorConfig::default());
        h.inbox.append("bad", "order_created", b"{").await.unwrap();
        h.letters.set_unavailable(true);

        let err = h.processor.process_batch().await.unwrap_err();

        assert!(matches!(err, BatchError::DeadLetter(_)));
        assert_eq!(h.inbox.outcome("bad"), None);
    }

    #[tokio::test]
    async fn test_batch_size_bounds_each_cycle() {
        let h = harness(ProcessorConfig {
            batch_size: 2,
            ..ProcessorConfig::default()
        });
        for i in 0..5 {
            let uid = uuid::Uuid::new_v4().to_string();
            h.inbox
                .append(&format!("msg-{i}"), "order_created", sample_payload(&uid, 100).as_bytes())
                .await
                .unwrap();
        }

        assert_eq!(h.processor.process_batch().await.unwrap().fetched, 2);
        assert_eq!(h.processor.process_batch().await.unwrap().fetched, 2);
        assert_eq!(h.processor.process_batch().await.unwrap().fetched, 1);
        assert_eq!(h.orders.len(), 5);
    }

    #[tokio::test]
    async fn test_lease_free_mode_reads_unprocessed() {
        let h = harness(ProcessorConfig {
            lease: Duration::ZERO,
            ..ProcessorConfig::default()
        });
        h.inbox.append("msg-1", "order_created", sample_payload(UID, 500).as_bytes()).await.unwrap();

        assert_eq!(h.processor.process_batch().await.unwrap().applied, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness(ProcessorConfig {
            poll_interval: Duration::from_millis(10),
            ..ProcessorConfig::default()
        });
        h.inbox.append("msg-1", "order_created", sample_payload(UID, 500).as_bytes()).await.unwrap();
        let (tx, rx) = watch::channel(false);

        let inbox = h.inbox.clone();
        let task = tokio::spawn(h.processor.run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(inbox.outcome("msg-1"), Some(ProcessingOutcome::Applied));
    }

    #[tokio::test]
    async fn test_service_error_is_not_confused_with_not_found() {
        let h = harness(ProcessorConfig::default());
        h.orders.set_unavailable(true);
        let service = OrdersService::new(Arc::new(InMemoryCache::default()), h.orders.clone(), h.metrics.clone());

        let err = service.get_order(UID).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));
    }
}
