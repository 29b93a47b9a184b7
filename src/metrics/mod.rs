use std::time::Duration;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// One `Metrics` handle is built at startup and passed into every component
// (intake, batch processor, DLQ actor, query service).
//
// Covers:
// - Intake: received / duplicate / failed appends
// - Batch processing: outcomes, quarantines, batch duration
// - Dead Letter Queue
// - Cache lookups
//
// Scraped via GET /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Intake Metrics
    pub inbox_received: IntCounter,
    pub inbox_duplicates: IntCounter,
    pub intake_failures: IntCounter,

    // Batch Processing Metrics
    pub messages_processed: IntCounterVec,
    pub messages_quarantined: IntCounterVec,
    pub batch_duration: Histogram,

    // DLQ Metrics
    pub dlq_messages_total: IntCounter,
    pub dlq_messages_by_reason: IntCounterVec,

    // Cache Metrics
    pub cache_lookups: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Intake Metrics
        let inbox_received = IntCounter::new(
            "inbox_messages_received_total",
            "Bus records handed to the inbox",
        )?;
        registry.register(Box::new(inbox_received.clone()))?;

        let inbox_duplicates = IntCounter::new(
            "inbox_messages_duplicate_total",
            "Bus records whose identity key was already staged",
        )?;
        registry.register(Box::new(inbox_duplicates.clone()))?;

        let intake_failures = IntCounter::new(
            "inbox_append_failures_total",
            "Bus records that could not be staged",
        )?;
        registry.register(Box::new(intake_failures.clone()))?;

        // Batch Processing Metrics
        let messages_processed = IntCounterVec::new(
            Opts::new("inbox_messages_processed_total", "Staged messages handled, by disposition"),
            &["outcome"],
        )?;
        registry.register(Box::new(messages_processed.clone()))?;

        let messages_quarantined = IntCounterVec::new(
            Opts::new(
                "inbox_messages_quarantined_total",
                "Staged messages marked processed without being applied",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(messages_quarantined.clone()))?;

        let batch_duration = Histogram::with_opts(
            HistogramOpts::new("inbox_batch_duration_seconds", "Inbox batch processing duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(batch_duration.clone()))?;

        // DLQ Metrics
        let dlq_messages_total = IntCounter::new(
            "dlq_messages_total",
            "Total messages in dead letter queue",
        )?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let dlq_messages_by_reason = IntCounterVec::new(
            Opts::new("dlq_messages_by_reason", "DLQ messages by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(dlq_messages_by_reason.clone()))?;

        // Cache Metrics
        let cache_lookups = IntCounterVec::new(
            Opts::new("cache_lookups_total", "Order cache lookups by result"),
            &["result"],
        )?;
        registry.register(Box::new(cache_lookups.clone()))?;

        Ok(Self {
            registry,
            inbox_received,
            inbox_duplicates,
            intake_failures,
            messages_processed,
            messages_quarantined,
            batch_duration,
            dlq_messages_total,
            dlq_messages_by_reason,
            cache_lookups,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_staged(&self, inserted: bool) {
        self.inbox_received.inc();
        if !inserted {
            self.inbox_duplicates.inc();
        }
    }

    pub fn record_intake_failure(&self) {
        self.intake_failures.inc();
    }

    pub fn record_processed(&self, outcome: &str) {
        self.messages_processed.with_label_values(&[outcome]).inc();
    }

    pub fn record_quarantine(&self, reason: &str) {
        self.messages_quarantined.with_label_values(&[reason]).inc();
    }

    pub fn observe_batch(&self, elapsed: Duration) {
        self.batch_duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_dlq_message(&self, reason: &str) {
        self.dlq_messages_total.inc();
        self.dlq_messages_by_reason.with_label_values(&[reason]).inc();
    }

    pub fn record_cache_lookup(&self, result: &str) {
        self.cache_lookups.with_label_values(&[result]).inc();
    }
}
