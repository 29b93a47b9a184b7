use async_trait::async_trait;
use sqlx::PgPool;

use crate::application::{DeadLetter, DeadLetterStore, StoreError};

pub struct PgDeadLetters {
    pool: PgPool,
}

impl PgDeadLetters {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterStore for PgDeadLetters {
    async fn insert(&self, letter: &DeadLetter) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO dead_letter_queue (
                id, message_id, topic, payload, reason,
                error_message, failure_count, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(letter.id)
        .bind(&letter.message_id)
        .bind(&letter.topic)
        .bind(&letter.payload)
        .bind(letter.reason.as_str())
        .bind(&letter.error_message)
        .bind(letter.failure_count)
        .bind(letter.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
