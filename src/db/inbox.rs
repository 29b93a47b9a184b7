use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::application::{InboxStore, ProcessingOutcome, StagedMessage, StoreError};

// ============================================================================
// Inbox - durable staging store for bus records
// ============================================================================
//
// Rows are keyed by message identity; a repeat append is a no-op. Rows are
// never deleted, only flipped to processed with an outcome.
//
// Claiming stamps a lease token + expiry on the selected rows under
// FOR UPDATE SKIP LOCKED, so concurrent processors never pick the same row
// while its lease is live. Completion and failure updates only apply while
// the row still carries the token it was read with; a processor whose lease
// expired and was re-claimed writes nothing.
//
// ============================================================================

pub struct PgInbox {
    pool: PgPool,
}

impl PgInbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct StagedRow {
    message_id: String,
    topic: String,
    payload: Vec<u8>,
    created_at: DateTime<Utc>,
    processed: bool,
    attempts: i32,
    lease_token: Option<Uuid>,
}

impl From<StagedRow> for StagedMessage {
    fn from(row: StagedRow) -> Self {
        Self {
            key: row.message_id,
            topic: row.topic,
            payload: row.payload,
            created_at: row.created_at,
            processed: row.processed,
            attempts: row.attempts,
            lease_token: row.lease_token,
        }
    }
}

#[async_trait]
impl InboxStore for PgInbox {
    async fn append(&self, key: &str, topic: &str, payload: &[u8]) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO inbox (message_id, topic, payload)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(topic)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fetch_unprocessed(&self, limit: i64) -> Result<Vec<StagedMessage>, StoreError> {
        let rows: Vec<StagedRow> = sqlx::query_as(
            r#"
            SELECT message_id, topic, payload, created_at, processed, attempts, lease_token
            FROM inbox
            WHERE processed = false
            ORDER BY created_at, message_id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StagedMessage::from).collect())
    }

    async fn claim_unprocessed(&self, limit: i64, lease: Duration) -> Result<Vec<StagedMessage>, StoreError> {
        let lease_token = Uuid::new_v4();

        let rows: Vec<StagedRow> = sqlx::query_as(
            r#"
            WITH candidates AS (
                SELECT message_id
                FROM inbox
                WHERE processed = false
                  AND (lease_expires_at IS NULL OR lease_expires_at < now())
                ORDER BY created_at, message_id
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE inbox i
            SET lease_token = $2,
                lease_expires_at = now() + make_interval(secs => $3)
            FROM candidates c
            WHERE i.message_id = c.message_id
            RETURNING i.message_id, i.topic, i.payload, i.created_at, i.processed, i.attempts, i.lease_token
            "#,
        )
        .bind(limit)
        .bind(lease_token)
        .bind(lease.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        // RETURNING carries no ordering guarantee.
        let mut messages: Vec<StagedMessage> = rows.into_iter().map(StagedMessage::from).collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));

        if !messages.is_empty() {
            tracing::debug!(
                lease_token = %lease_token,
                claimed = messages.len(),
                "Claimed inbox messages"
            );
        }

        Ok(messages)
    }

    async fn mark_processed(&self, message: &StagedMessage, outcome: ProcessingOutcome) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inbox
            SET processed = true,
                outcome = $3,
                lease_token = NULL,
                lease_expires_at = NULL
            WHERE message_id = $1
              AND processed = false
              AND lease_token IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(&message.key)
        .bind(message.lease_token)
        .bind(outcome.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(
                message_id = %message.key,
                outcome = outcome.as_str(),
                "Inbox message no longer held by this lease, outcome not recorded"
            );
            return Ok(false);
        }

        Ok(true)
    }

    async fn record_failure(&self, message: &StagedMessage, error: &str) -> Result<Option<i32>, StoreError> {
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE inbox
            SET attempts = attempts + 1,
                last_error = $3,
                lease_token = NULL,
                lease_expires_at = NULL
            WHERE message_id = $1
              AND processed = false
              AND lease_token IS NOT DISTINCT FROM $2
            RETURNING attempts
            "#,
        )
        .bind(&message.key)
        .bind(message.lease_token)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        if attempts.is_none() {
            tracing::warn!(message_id = %message.key, "Inbox message no longer held by this lease, failure not recorded");
        }

        Ok(attempts)
    }
}

// ============================================================================
// Integration Tests (require PostgreSQL, run with `--ignored`)
// ============================================================================
