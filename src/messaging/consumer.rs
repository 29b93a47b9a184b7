use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use kameo::actor::ActorRef;
use tokio::sync::watch;

use crate::actors::{HealthMonitorActor, HealthStatus, UpdateHealth};
use crate::application::{InboxStore, StoreError};
use crate::config::KafkaConfig;
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

// ============================================================================
// Inbox Consumer - Kafka → inbox
// ============================================================================
//
// Offsets are committed manually, and only after the record is durably
// staged. A crash between staging and commit redelivers the record; the
// inbox drops the repeat by its identity key.
//
// Commits are cumulative per partition, so a record that cannot be staged
// holds its partition: staging is retried with backoff until it succeeds or
// shutdown, and nothing after it is committed in the meantime.
//
// ============================================================================

const STALL_BACKOFF: Duration = Duration::from_secs(1);

/// Identity key for a bus record: its key when present and storable as
/// text, else its coordinates.
pub fn message_identity(key: Option<&[u8]>, topic: &str, partition: i32, offset: i64) -> String {
    match key.map(std::str::from_utf8) {
        Some(Ok(key)) if !key.is_empty() && !key.contains('\0') => key.to_string(),
        _ => format!("{topic}/{partition}/{offset}"),
    }
}

/// Appends records to the inbox with bounded retry on transient failures.
pub struct Stager {
    inbox: Arc<dyn InboxStore>,
    metrics: Arc<Metrics>,
    retry: RetryConfig,
    stall_backoff: Duration,
    health_monitor: Option<ActorRef<HealthMonitorActor>>,
}

impl Stager {
    pub fn new(inbox: Arc<dyn InboxStore>, metrics: Arc<Metrics>) -> Self {
        Self {
            inbox,
            metrics,
            retry: RetryConfig::default(),
            stall_backoff: STALL_BACKOFF,
            health_monitor: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stall_backoff(mut self, stall_backoff: Duration) -> Self {
        self.stall_backoff = stall_backoff;
        self
    }

    pub fn with_health_monitor(mut self, health_monitor: ActorRef<HealthMonitorActor>) -> Self {
        self.health_monitor = Some(health_monitor);
        self
    }

    /// Returns whether the record was new to the inbox.
    pub async fn stage(&self, key: &str, topic: &str, payload: &[u8]) -> RetryResult<bool, StoreError> {
        let inbox = self.inbox.clone();
        let result = retry_on_transient(&self.retry, |_attempt| {
            let inbox = inbox.clone();
            async move { inbox.append(key, topic, payload).await }
        })
        .await;

        match &result {
            RetryResult::Success(inserted) => {
                self.metrics.record_staged(*inserted);
                if *inserted {
                    tracing::debug!(message_id = %key, topic = %topic, "📥 Message staged");
                } else {
                    tracing::debug!(message_id = %key, "⏭️  Message already staged, skipping");
                }
            }
            RetryResult::Failed(_) | RetryResult::PermanentFailure(_) => {
                self.metrics.record_intake_failure();
            }
        }

        result
    }

    /// Stage the record, holding it until the inbox accepts it. Returns
    /// whether it was new, or `None` if shutdown came first and the record
    /// is still unstaged.
    pub async fn hold_until_staged(
        &self,
        key: &str,
        topic: &str,
        payload: &[u8],
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<bool> {
        loop {
            let error = match self.stage(key, topic, payload).await {
                RetryResult::Success(inserted) => {
                    self.report_health(HealthStatus::Healthy).await;
                    return Some(inserted);
                }
                RetryResult::PermanentFailure(e) => {
                    tracing::error!(message_id = %key, error = %e, "❌ Inbox rejected message, holding partition");
                    e
                }
                RetryResult::Failed(e) => {
                    tracing::warn!(message_id = %key, error = %e, "Inbox unreachable, holding message");
                    e
                }
            };

            self.report_health(HealthStatus::Degraded(format!("cannot stage {key}: {error}")))
                .await;

            if *shutdown.borrow() {
                return None;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => return None,
                _ = tokio::time::sleep(self.stall_backoff) => {}
            }
        }
    }

    async fn report_health(&self, status: HealthStatus) {
        if let Some(ref health_monitor) = self.health_monitor {
            // Fire and forget - use tell
            let _ = health_monitor
                .tell(UpdateHealth {
                    component: "intake".to_string(),
                    status,
                    details: None,
                })
                .send()
                .await;
        }
    }
}

pub struct InboxConsumer {
    consumer: StreamConsumer,
    stager: Stager,
    topic: String,
}

impl InboxConsumer {
    pub fn new(config: &KafkaConfig, stager: Stager) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()?;

        consumer.subscribe(&[config.topic.as_str()])?;

        tracing::info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "✅ Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            stager,
            topic: config.topic.clone(),
        })
    }

    pub fn with_health_monitor(mut self, health_monitor: ActorRef<HealthMonitorActor>) -> Self {
        self.stager = self.stager.with_health_monitor(health_monitor);
        self
    }

    /// Receive until the shutdown flag flips. A record being staged is
    /// finished before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(topic = %self.topic, "🔄 Inbox consumer started");
        self.stager.report_health(HealthStatus::Healthy).await;

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                received = self.consumer.recv() => received,
            };

            match received {
                Ok(record) => {
                    if !self.handle(&record, &mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Kafka receive error");
                    self.stager
                        .report_health(HealthStatus::Degraded(e.to_string()))
                        .await;
                }
            }
        }

        tracing::info!("🛑 Inbox consumer stopped");
    }

    /// Stage and commit one record. Returns `false` if shutdown interrupted
    /// a held record, which is then left uncommitted for redelivery.
    async fn handle(&self, record: &BorrowedMessage<'_>, shutdown: &mut watch::Receiver<bool>) -> bool {
        let key = message_identity(record.key(), record.topic(), record.partition(), record.offset());
        let payload = record.payload().unwrap_or_default();

        if self
            .stager
            .hold_until_staged(&key, record.topic(), payload, shutdown)
            .await
            .is_none()
        {
            tracing::info!(
                message_id = %key,
                partition = record.partition(),
                offset = record.offset(),
                "Shutdown while holding message, leaving it uncommitted"
            );
            return false;
        }

        if let Err(e) = self.consumer.commit_message(record, CommitMode::Async) {
            tracing::warn!(message_id = %key, error = %e, "Offset commit failed");
        }
        true
    }
}
